use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use charles_core::current_unix_timestamp_ms;
use charles_github_issues::command_classifier::{CommandCategory, CommandClassifier};
use charles_github_issues::comment_scanner::find_actionable_mention;
use charles_github_issues::issue_comment::render_response;
use charles_github_issues::mention::{Mention, RawComment};
use serde::Serialize;

use super::action_log::ActionLog;
use super::bot_services::BotServices;
use super::command::{validate_comment, Command};
use super::repo_view::RepoView;
use super::step_engine::PlanOutcome;
use super::workflow_builder::WorkflowBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Nothing to answer.
    Ignored,
    Completed,
    /// The plan aborted and the failure was answered at the plan root.
    Failed,
    /// The command could not be resolved; an error reply was attempted.
    Errored,
    TimedOut,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Summary of one Action, appended to the action ledger.
pub struct ActionReport {
    pub action_id: String,
    pub repo: String,
    pub issue_number: u64,
    pub category: Option<CommandCategory>,
    pub status: ActionStatus,
    pub started_unix_ms: u64,
    pub completed_unix_ms: u64,
    pub log_address: String,
}

/// Executes one Mention end to end.
pub struct ActionRunner {
    services: BotServices,
    classifier: CommandClassifier,
    bot_login: String,
    logs_dir: PathBuf,
    logs_base_url: String,
}

impl ActionRunner {
    pub fn new(
        services: BotServices,
        classifier: CommandClassifier,
        bot_login: &str,
        logs_dir: PathBuf,
        logs_base_url: &str,
    ) -> Self {
        Self {
            services,
            classifier,
            bot_login: bot_login.trim().to_string(),
            logs_dir,
            logs_base_url: logs_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn new_action_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub async fn run(&self, action_id: &str, mention: &Mention) -> ActionReport {
        let started_unix_ms = current_unix_timestamp_ms();
        let log = ActionLog::open_or_detached(&self.logs_dir, action_id, &self.logs_base_url);
        log.info(format!(
            "started action {action_id} for {}#{}",
            mention.repo_full_name(),
            mention.issue.number
        ));
        let (status, category) = self.perform(mention, &log).await;
        log.info(format!("finished action {action_id}: {}", status.as_str()));
        ActionReport {
            action_id: action_id.to_string(),
            repo: mention.repo_full_name(),
            issue_number: mention.issue.number,
            category,
            status,
            started_unix_ms,
            completed_unix_ms: current_unix_timestamp_ms(),
            log_address: log.address().to_string(),
        }
    }

    /// Report for an Action cancelled by the pool timeout. No reply is posted
    /// because the Action may already have answered.
    pub fn timed_out(
        &self,
        action_id: &str,
        mention: &Mention,
        started_unix_ms: u64,
        limit: Duration,
    ) -> ActionReport {
        let log = ActionLog::open_or_detached(&self.logs_dir, action_id, &self.logs_base_url);
        log.warn(format!(
            "action {action_id} timed out after {}ms, no reply posted",
            limit.as_millis()
        ));
        ActionReport {
            action_id: action_id.to_string(),
            repo: mention.repo_full_name(),
            issue_number: mention.issue.number,
            category: None,
            status: ActionStatus::TimedOut,
            started_unix_ms,
            completed_unix_ms: current_unix_timestamp_ms(),
            log_address: log.address().to_string(),
        }
    }

    async fn perform(
        &self,
        mention: &Mention,
        log: &ActionLog,
    ) -> (ActionStatus, Option<CommandCategory>) {
        let comment = match self.resolve_comment(mention).await {
            Ok(comment) => comment,
            Err(error) => {
                log.error(format!("could not resolve the command: {error:#}"));
                self.send_error_reply(mention, log).await;
                return (ActionStatus::Errored, None);
            }
        };
        let comment = match validate_comment(comment) {
            Ok(comment) => comment,
            Err(error) => {
                log.info(format!("{error}"));
                return (ActionStatus::Ignored, None);
            }
        };

        let classification = self.classifier.classify(&comment.body, &self.bot_login);
        let category = classification.category;
        log.info(format!(
            "comment {} by {} understood as {} ({})",
            comment.id,
            comment.author_login,
            category.as_str(),
            classification.language.name()
        ));
        let repo = RepoView::new(mention.issue.repo.clone(), Arc::clone(&self.services.github));
        let command = Command::new(
            mention.issue.clone(),
            comment,
            classification,
            &self.bot_login,
            repo,
        );
        let steps = WorkflowBuilder::new(&self.services).build(category);
        let status = match steps.perform(&command, log).await {
            PlanOutcome::Completed => ActionStatus::Completed,
            PlanOutcome::Failed { .. } => ActionStatus::Failed,
        };
        (status, Some(category))
    }

    async fn resolve_comment(&self, mention: &Mention) -> Result<RawComment> {
        let github = &self.services.github;
        let latest = match mention.latest_comment_id {
            Some(comment_id) => Some(RawComment::from(
                &github
                    .issue_comment(&mention.issue.repo, comment_id)
                    .await
                    .with_context(|| format!("failed to read comment {comment_id}"))?,
            )),
            None => None,
        };
        if let Some(latest) = &latest {
            let found = find_actionable_mention(Some(latest), &[], &self.bot_login);
            if !found.is_sentinel() {
                return Ok(found);
            }
        }
        let comments = github
            .list_issue_comments(&mention.issue)
            .await
            .with_context(|| {
                format!(
                    "failed to list comments of {}#{}",
                    mention.repo_full_name(),
                    mention.issue.number
                )
            })?
            .iter()
            .map(RawComment::from)
            .collect::<Vec<_>>();
        Ok(find_actionable_mention(None, &comments, &self.bot_login))
    }

    async fn send_error_reply(&self, mention: &Mention, log: &ActionLog) {
        let language = self.classifier.primary_language();
        let Some(body) = render_response(
            language.as_ref(),
            "error.comment",
            &[("logs", log.address()), ("bot", self.bot_login.as_str())],
        ) else {
            log.error(format!("no error.comment template in {}", language.name()));
            return;
        };
        match self
            .services
            .github
            .create_issue_comment(&mention.issue, &body)
            .await
        {
            Ok(()) => log.info("error reply sent"),
            Err(error) => log.error(format!("error reply could not be sent: {error:#}")),
        }
    }
}
