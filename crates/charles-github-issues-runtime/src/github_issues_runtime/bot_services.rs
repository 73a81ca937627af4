//! Capability interfaces for the remote collaborators an Action talks to.
//!
//! Implementations are shared across concurrently running Actions, so every
//! call must be independent and safe to issue in parallel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use charles_github_issues::github_types::{
    GithubIssueComment, GithubNotification, GithubRepository, OrgMembership,
};
use charles_github_issues::mention::{IssueRef, RepoRef};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn authenticated_login(&self) -> Result<String>;
    async fn list_notifications(&self) -> Result<Vec<GithubNotification>>;
    async fn mark_notifications_read(&self, last_read_at: &str) -> Result<()>;
    async fn issue_comment(&self, repo: &RepoRef, comment_id: u64) -> Result<GithubIssueComment>;
    async fn list_issue_comments(&self, issue: &IssueRef) -> Result<Vec<GithubIssueComment>>;
    async fn create_issue_comment(&self, issue: &IssueRef, body: &str) -> Result<()>;
    async fn repository(&self, repo: &RepoRef) -> Result<GithubRepository>;
    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool>;
    /// `None` when the user is not a member of the organization.
    async fn org_membership(&self, org: &str, login: &str) -> Result<Option<OrgMembership>>;
    async fn is_starred(&self, repo: &RepoRef) -> Result<bool>;
    async fn star(&self, repo: &RepoRef) -> Result<()>;
    /// Returns the raw HTTP status; GitHub answers 204 on success.
    async fn follow_user(&self, login: &str) -> Result<u16>;
    /// File contents on the default branch, `None` when the file does not exist.
    async fn file_contents(&self, repo: &RepoRef, path: &str) -> Result<Option<String>>;
    /// Public email of a user's profile, `None` when it is hidden.
    async fn user_email(&self, login: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One crawled document as stored in the search index.
pub struct WebPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub url: String,
    /// Browser driver requested by `.charles.yml`.
    pub driver: String,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn exists(&self, index: &str) -> Result<bool>;
    async fn export(&self, index: &str, pages: &[WebPage]) -> Result<()>;
    async fn delete_index(&self, index: &str) -> Result<()>;
    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<()>;
}

#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl_page(&self, request: &CrawlRequest) -> Result<WebPage>;
    async fn crawl_site(&self, request: &CrawlRequest) -> Result<Vec<WebPage>>;
    async fn crawl_sitemap(&self, request: &CrawlRequest) -> Result<Vec<WebPage>>;
}

#[async_trait]
pub trait Tweeter: Send + Sync {
    async fn tweet(&self, message: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// Retries every crawl variant up to `attempts` times with a fixed pause.
pub struct RetriableCrawler {
    inner: Arc<dyn Crawler>,
    attempts: usize,
    pause: Duration,
}

impl RetriableCrawler {
    pub fn new(inner: Arc<dyn Crawler>, attempts: usize, pause: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            pause,
        }
    }

    async fn retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        attempts = self.attempts,
                        "crawl attempt failed: {error:#}"
                    );
                    last_error = Some(error);
                    if attempt < self.attempts && !self.pause.is_zero() {
                        tokio::time::sleep(self.pause).await;
                    }
                }
            }
        }
        match last_error {
            Some(error) => Err(error.context(format!(
                "{operation} failed after {} attempts",
                self.attempts
            ))),
            None => bail!("{operation} was never attempted"),
        }
    }
}

#[async_trait]
impl Crawler for RetriableCrawler {
    async fn crawl_page(&self, request: &CrawlRequest) -> Result<WebPage> {
        self.retry("crawl page", || self.inner.crawl_page(request))
            .await
    }

    async fn crawl_site(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        self.retry("crawl site", || self.inner.crawl_site(request))
            .await
    }

    async fn crawl_sitemap(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        self.retry("crawl sitemap", || self.inner.crawl_sitemap(request))
            .await
    }
}

#[derive(Clone)]
/// The stateless remote clients shared by every Action.
pub struct BotServices {
    pub github: Arc<dyn GithubApi>,
    pub index: Arc<dyn SearchIndex>,
    pub crawler: Arc<dyn Crawler>,
    /// Present only when all four Twitter credentials are configured.
    pub tweeter: Option<Arc<dyn Tweeter>>,
    /// Present only when an SMTP relay is configured.
    pub mailer: Option<Arc<dyn Mailer>>,
}
