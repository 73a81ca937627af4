//! Notifications poller and Action dispatch for the Charles GitHub bot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use charles_core::{current_rfc3339_utc, current_unix_timestamp_ms, LogRotationPolicy};
use charles_github_issues::command_classifier::CommandClassifier;
use charles_github_issues::mention::Mention;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

pub mod action_ledger;
pub mod action_log;
pub mod action_runner;
pub mod authorization_planner;
pub mod bot_services;
pub mod command;
pub mod elasticsearch_index;
pub mod github_api_client;
pub mod http_crawler;
pub mod repo_view;
pub mod side_effects;
pub mod smtp_mailer;
pub mod step_engine;
pub mod twitter_client;
pub mod workflow_builder;

#[cfg(test)]
mod tests;

use action_ledger::{ActionLedger, ACTION_LEDGER_FILE};
use action_runner::{ActionReport, ActionRunner, ActionStatus};
use bot_services::{BotServices, GithubApi, Mailer, RetriableCrawler, Tweeter};
use elasticsearch_index::ElasticsearchIndex;
use github_api_client::GithubApiClient;
use http_crawler::HttpCrawler;
use smtp_mailer::{SmtpMailer, SmtpSettings};
use twitter_client::{TwitterApiClient, TwitterCredentials};

const CRAWL_RETRY_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
/// Process configuration, built once by the binary and passed down.
pub struct BotRuntimeConfig {
    pub api_base: String,
    pub token: String,
    pub bot_login: Option<String>,
    pub poll_interval: Duration,
    pub poll_once: bool,
    pub max_concurrent_actions: usize,
    pub action_timeout: Option<Duration>,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub logs_dir: PathBuf,
    pub logs_base_url: String,
    pub ledger_rotation: LogRotationPolicy,
    pub index_endpoint: String,
    pub crawl_retry_attempts: usize,
    pub crawl_max_pages: usize,
    pub twitter: Option<TwitterCredentials>,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone)]
/// Settings of the poller and its worker pool.
pub struct RuntimeSettings {
    pub poll_interval: Duration,
    pub poll_once: bool,
    pub max_concurrent_actions: usize,
    pub action_timeout: Option<Duration>,
    pub logs_dir: PathBuf,
    pub logs_base_url: String,
    pub ledger_rotation: LogRotationPolicy,
}

impl RuntimeSettings {
    pub fn from_config(config: &BotRuntimeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            poll_once: config.poll_once,
            max_concurrent_actions: config.max_concurrent_actions,
            action_timeout: config.action_timeout,
            logs_dir: config.logs_dir.clone(),
            logs_base_url: config.logs_base_url.clone(),
            ledger_rotation: config.ledger_rotation,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollCycleReport {
    pub notifications: usize,
    pub dispatched_actions: usize,
    pub skipped_notifications: usize,
    pub finished_actions: usize,
    pub failed_actions: usize,
}

/// Build the concrete collaborators described by `config`.
pub fn build_bot_services(config: &BotRuntimeConfig) -> Result<BotServices> {
    let github = GithubApiClient::new(
        config.api_base.clone(),
        config.token.clone(),
        config.request_timeout_ms,
        config.retry_max_attempts,
        config.retry_base_delay_ms,
    )?;
    let index = ElasticsearchIndex::new(config.index_endpoint.clone(), config.request_timeout_ms)?;
    let crawler = HttpCrawler::new(config.request_timeout_ms, config.crawl_max_pages)?;
    let tweeter = match &config.twitter {
        Some(credentials) => Some(Arc::new(TwitterApiClient::new(
            credentials.clone(),
            config.request_timeout_ms,
        )?) as Arc<dyn Tweeter>),
        None => None,
    };
    let mailer = match &config.smtp {
        Some(settings) => Some(Arc::new(SmtpMailer::new(settings, config.request_timeout_ms)?)
            as Arc<dyn Mailer>),
        None => None,
    };
    Ok(BotServices {
        github: Arc::new(github),
        index: Arc::new(index),
        crawler: Arc::new(RetriableCrawler::new(
            Arc::new(crawler),
            config.crawl_retry_attempts,
            CRAWL_RETRY_PAUSE,
        )),
        tweeter,
        mailer,
    })
}

/// Runs the bot: resolve its login, then poll notifications until shutdown.
pub async fn run_charles_bot(config: BotRuntimeConfig) -> Result<()> {
    let services = build_bot_services(&config)?;
    let bot_login = match config.bot_login.as_deref().map(str::trim) {
        Some(login) if !login.is_empty() => login.to_string(),
        _ => services
            .github
            .authenticated_login()
            .await
            .context("failed to resolve bot login")?,
    };
    tracing::info!(bot_login = %bot_login, api_base = %config.api_base, "charles bot starting");
    let mut runtime = NotificationsRuntime::new(
        RuntimeSettings::from_config(&config),
        services,
        CommandClassifier::default(),
        &bot_login,
    )?;
    runtime.run().await
}

/// Polls mention notifications and runs each as an Action on a bounded pool.
pub struct NotificationsRuntime {
    settings: RuntimeSettings,
    github: Arc<dyn GithubApi>,
    runner: Arc<ActionRunner>,
    permits: Arc<Semaphore>,
    in_flight: JoinSet<ActionReport>,
    ledger: ActionLedger,
}

impl NotificationsRuntime {
    pub fn new(
        settings: RuntimeSettings,
        services: BotServices,
        classifier: CommandClassifier,
        bot_login: &str,
    ) -> Result<Self> {
        let ledger = ActionLedger::open(
            settings.logs_dir.join(ACTION_LEDGER_FILE),
            settings.ledger_rotation,
        )?;
        let github = Arc::clone(&services.github);
        let runner = ActionRunner::new(
            services,
            classifier,
            bot_login,
            settings.logs_dir.clone(),
            &settings.logs_base_url,
        );
        Ok(Self {
            permits: Arc::new(Semaphore::new(settings.max_concurrent_actions.max(1))),
            settings,
            github,
            runner: Arc::new(runner),
            in_flight: JoinSet::new(),
            ledger,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.check_for_notifications().await {
                Ok(report) => {
                    tracing::info!(
                        notifications = report.notifications,
                        dispatched = report.dispatched_actions,
                        skipped = report.skipped_notifications,
                        finished = report.finished_actions,
                        failed = report.failed_actions,
                        "notifications poll"
                    );
                    if self.settings.poll_once {
                        let drained = self.wait_for_actions().await;
                        tracing::info!(finished = drained.len(), "one-shot poll complete");
                        return Ok(());
                    }
                }
                Err(error) => {
                    tracing::error!("notifications poll error: {error:#}");
                    if self.settings.poll_once {
                        self.wait_for_actions().await;
                        return Err(error);
                    }
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(in_flight = self.in_flight.len(), "shutdown requested");
                    self.wait_for_actions().await;
                    return Ok(());
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// One poll cycle followed by waiting for every dispatched Action.
    pub async fn poll_once(&mut self) -> Result<Vec<ActionReport>> {
        let result = self.check_for_notifications().await;
        let reports = self.wait_for_actions().await;
        result.map(|_| reports)
    }

    /// List unread notifications, dispatch one Action per issue mention,
    /// then mark the notifications read. Does not wait for the Actions.
    pub async fn check_for_notifications(&mut self) -> Result<PollCycleReport> {
        let mut report = PollCycleReport::default();
        self.drain_finished(&mut report);

        let last_read_at = current_rfc3339_utc();
        let notifications = self
            .github
            .list_notifications()
            .await
            .context("failed to list notifications")?;
        report.notifications = notifications.len();

        for notification in &notifications {
            if !notification.is_issue_mention() {
                report.skipped_notifications += 1;
                continue;
            }
            match Mention::from_notification(notification) {
                Ok(mention) => {
                    let action_id = self.dispatch(mention);
                    tracing::debug!(
                        action_id = %action_id,
                        notification = %notification.id,
                        "dispatched"
                    );
                    report.dispatched_actions += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        notification = %notification.id,
                        "skipping notification: {error:#}"
                    );
                    report.skipped_notifications += 1;
                }
            }
        }

        if !notifications.is_empty() {
            self.github
                .mark_notifications_read(&last_read_at)
                .await
                .context("failed to mark notifications as read")?;
        }
        Ok(report)
    }

    /// Spawn one Action. It starts once a pool permit is free.
    pub fn dispatch(&mut self, mention: Mention) -> String {
        let action_id = ActionRunner::new_action_id();
        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);
        let action_timeout = self.settings.action_timeout;
        let task_action_id = action_id.clone();
        self.in_flight.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let started_unix_ms = current_unix_timestamp_ms();
            let Some(limit) = action_timeout else {
                return runner.run(&task_action_id, &mention).await;
            };
            match tokio::time::timeout(limit, runner.run(&task_action_id, &mention)).await {
                Ok(report) => report,
                Err(_) => runner.timed_out(&task_action_id, &mention, started_unix_ms, limit),
            }
        });
        action_id
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for every in-flight Action and return their reports.
    pub async fn wait_for_actions(&mut self) -> Vec<ActionReport> {
        let mut report = PollCycleReport::default();
        let mut finished = Vec::new();
        while let Some(joined) = self.in_flight.join_next().await {
            finished.extend(self.record(joined, &mut report));
        }
        finished
    }

    fn drain_finished(&mut self, report: &mut PollCycleReport) {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.record(joined, report);
        }
    }

    fn record(
        &self,
        joined: Result<ActionReport, JoinError>,
        report: &mut PollCycleReport,
    ) -> Option<ActionReport> {
        report.finished_actions += 1;
        let action = match joined {
            Ok(action) => action,
            Err(error) => {
                report.failed_actions += 1;
                tracing::error!("action task aborted: {error}");
                return None;
            }
        };
        if matches!(
            action.status,
            ActionStatus::Failed | ActionStatus::Errored | ActionStatus::TimedOut
        ) {
            report.failed_actions += 1;
        }
        tracing::info!(
            action_id = %action.action_id,
            repo = %action.repo,
            issue = action.issue_number,
            status = action.status.as_str(),
            "action finished"
        );
        if let Err(error) = self.ledger.append(&action) {
            tracing::warn!("failed to append action ledger: {error:#}");
        }
        Some(action)
    }
}
