use std::sync::Arc;

use anyhow::Result;
use charles_github_issues::command_classifier::{Classification, CommandCategory, Language};
use charles_github_issues::command_text::index_name;
use charles_github_issues::mention::{IssueRef, RawComment};
use thiserror::Error;

use super::repo_view::RepoView;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command: nothing to answer")]
    EmptyCommand,
}

/// Reject the sentinel and blank comments; they are silently ignored upstream.
pub fn validate_comment(comment: RawComment) -> Result<RawComment, CommandError> {
    if comment.is_sentinel() || comment.body.trim().is_empty() {
        return Err(CommandError::EmptyCommand);
    }
    Ok(comment)
}

/// A classified command. Category and language are fixed at construction.
pub struct Command {
    issue: IssueRef,
    comment: RawComment,
    category: CommandCategory,
    language: Arc<dyn Language>,
    bot_login: String,
    repo: RepoView,
}

impl Command {
    pub fn new(
        issue: IssueRef,
        comment: RawComment,
        classification: Classification,
        bot_login: &str,
        repo: RepoView,
    ) -> Self {
        Self {
            issue,
            comment,
            category: classification.category,
            language: classification.language,
            bot_login: bot_login.to_string(),
            repo,
        }
    }

    pub fn issue(&self) -> &IssueRef {
        &self.issue
    }

    pub fn body(&self) -> &str {
        &self.comment.body
    }

    pub fn author_login(&self) -> &str {
        &self.comment.author_login
    }

    pub fn category(&self) -> CommandCategory {
        self.category
    }

    pub fn language(&self) -> &dyn Language {
        self.language.as_ref()
    }

    pub fn bot_login(&self) -> &str {
        &self.bot_login
    }

    pub fn repo(&self) -> &RepoView {
        &self.repo
    }

    /// Index name derived from the mention's repository slug; needs no IO.
    pub fn index_name(&self) -> String {
        let repo = self.repo.repo();
        index_name(&repo.owner, &repo.name)
    }
}

#[derive(Debug, Clone, Default)]
/// Placeholder values for reply templates.
pub struct TemplateVars {
    pairs: Vec<(&'static str, String)>,
}

impl TemplateVars {
    /// Values every reply can use without extra IO.
    pub fn for_command(command: &Command, logs_address: &str) -> Self {
        let repo = command.repo().repo();
        Self::default()
            .with("author", command.author_login())
            .with("bot", command.bot_login())
            .with("repo", &repo.as_slug())
            .with("owner", &repo.owner)
            .with("name", &repo.name)
            .with("index", &command.index_name())
            .with("issue", &command.issue().html_url())
            .with("logs", logs_address)
    }

    pub fn with(mut self, key: &'static str, value: &str) -> Self {
        self.pairs.retain(|(existing, _)| *existing != key);
        self.pairs.push((key, value.to_string()));
        self
    }

    pub fn as_pairs(&self) -> Vec<(&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect()
    }
}
