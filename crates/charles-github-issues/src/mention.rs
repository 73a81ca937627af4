use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::github_types::{GithubIssueComment, GithubNotification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Immutable snapshot of one issue comment.
pub struct RawComment {
    pub id: i64,
    pub body: String,
    pub author_login: String,
}

impl RawComment {
    /// The "nothing to answer" value: `{id: -1, body: ""}`.
    pub fn sentinel() -> Self {
        Self {
            id: -1,
            body: String::new(),
            author_login: String::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == -1
    }
}

impl From<&GithubIssueComment> for RawComment {
    fn from(comment: &GithubIssueComment) -> Self {
        Self {
            id: i64::try_from(comment.id).unwrap_or(i64::MAX),
            body: comment.body.clone().unwrap_or_default(),
            author_login: comment.user.login.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl IssueRef {
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/issues/{}", self.repo.as_slug(), self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One mention of the bot, produced once per poll cycle.
pub struct Mention {
    pub issue: IssueRef,
    pub latest_comment_id: Option<u64>,
}

impl Mention {
    pub fn repo_full_name(&self) -> String {
        self.issue.repo.as_slug()
    }

    /// Derive a mention from an issue notification's subject URLs.
    pub fn from_notification(notification: &GithubNotification) -> Result<Self> {
        let repo = RepoRef::parse(&notification.repository.full_name)?;
        let subject_url = notification
            .subject
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("notification {} has no subject url", notification.id))?;
        let number = trailing_number(subject_url, "/issues/").ok_or_else(|| {
            anyhow!(
                "notification {} subject url '{subject_url}' is not an issue",
                notification.id
            )
        })?;
        let latest_comment_id = notification
            .subject
            .latest_comment_url
            .as_deref()
            .and_then(|url| trailing_number(url, "/issues/comments/"));
        Ok(Self {
            issue: IssueRef { repo, number },
            latest_comment_id,
        })
    }
}

fn trailing_number(url: &str, marker: &str) -> Option<u64> {
    let index = url.rfind(marker)?;
    let tail = &url[index + marker.len()..];
    tail.trim_end_matches('/').parse::<u64>().ok()
}
