//! Runtime crate for the Charles GitHub issues bot.
//!
//! Polls mention notifications, resolves the actionable comment, classifies
//! it and runs the matching Action plan against GitHub, the search index,
//! the crawler, Twitter and SMTP.

pub mod github_issues_runtime;

pub use github_issues_runtime::action_runner::{ActionReport, ActionRunner, ActionStatus};
pub use github_issues_runtime::bot_services::{
    BotServices, CrawlRequest, Crawler, Envelope, GithubApi, Mailer, SearchIndex, Tweeter,
    WebPage,
};
pub use github_issues_runtime::smtp_mailer::{SmtpSettings, DEFAULT_SMTP_PORT};
pub use github_issues_runtime::twitter_client::TwitterCredentials;
pub use github_issues_runtime::{
    build_bot_services, run_charles_bot, BotRuntimeConfig, NotificationsRuntime, PollCycleReport,
    RuntimeSettings,
};
