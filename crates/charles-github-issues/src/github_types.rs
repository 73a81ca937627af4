use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Public struct `GithubUser` used across Charles components.
pub struct GithubUser {
    pub login: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// `GET /users/{login}`; only the fields the bot reads.
pub struct GithubUserProfile {
    pub login: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl GithubUserProfile {
    pub fn public_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
    }
}

impl GithubUser {
    pub fn is_organization(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case("organization"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Public struct `GithubIssueComment` used across Charles components.
pub struct GithubIssueComment {
    pub id: u64,
    pub body: Option<String>,
    pub user: GithubUser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubNotificationSubject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub latest_comment_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubNotificationRepository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// One entry of `GET /notifications`.
pub struct GithubNotification {
    pub id: String,
    pub reason: String,
    pub subject: GithubNotificationSubject,
    pub repository: GithubNotificationRepository,
}

impl GithubNotification {
    /// True for notifications raised by an `@mention` on an issue.
    pub fn is_issue_mention(&self) -> bool {
        self.reason == "mention" && self.subject.kind == "Issue"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Repository metadata returned by `GET /repos/{owner}/{repo}`.
pub struct GithubRepository {
    pub name: String,
    pub full_name: String,
    pub owner: GithubUser,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
/// Membership returned by `GET /orgs/{org}/memberships/{user}`.
pub struct OrgMembership {
    pub state: String,
    pub role: String,
}

impl OrgMembership {
    pub fn is_active_admin(&self) -> bool {
        self.state == "active" && self.role == "admin"
    }
}
