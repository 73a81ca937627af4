use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use charles_github_issues::github_transport_helpers::{
    is_retryable_github_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};
use charles_github_issues::github_types::{
    GithubIssueComment, GithubNotification, GithubRepository, GithubUserProfile, OrgMembership,
};
use charles_github_issues::mention::{IssueRef, RepoRef};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::bot_services::GithubApi;

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct GithubContentResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Clone)]
/// GitHub REST v3 client with retry on rate limits and server errors.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("charles-github-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn repo_url(&self, repo: &RepoRef, suffix: &str) -> String {
        self.url(&format!("/repos/{}/{}{suffix}", repo.owner, repo.name))
    }

    /// Send with retries; returns the last response whatever its status.
    async fn send_with_retry<F>(
        &self,
        operation: &str,
        mut request_builder: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(
                    "x-charles-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if attempt < self.retry_max_attempts
                        && is_retryable_github_status(status.as_u16())
                    {
                        let retry_after = parse_retry_after(response.headers());
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }

    async fn fail(operation: &str, response: reqwest::Response) -> anyhow::Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        anyhow!(
            "github api {operation} failed with status {status}: {}",
            truncate_for_error(&body, 800)
        )
    }

    async fn request_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(operation, request_builder).await?;
        if !response.status().is_success() {
            return Err(Self::fail(operation, response).await);
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {operation}"))
    }

    /// Like `request_json`, but a 404 yields `None`.
    async fn request_optional_json<T, F>(
        &self,
        operation: &str,
        request_builder: F,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(operation, request_builder).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::fail(operation, response).await);
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .with_context(|| format!("failed to decode github {operation}"))
    }

    /// Succeeds on any 2xx status without decoding a body.
    async fn request_ok<F>(&self, operation: &str, request_builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(operation, request_builder).await?;
        if !response.status().is_success() {
            return Err(Self::fail(operation, response).await);
        }
        Ok(())
    }

    /// `true` on 2xx, `false` on 404, error otherwise.
    async fn request_presence<F>(&self, operation: &str, request_builder: F) -> Result<bool>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(operation, request_builder).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Err(Self::fail(operation, response).await)
    }

    async fn paginate<T, F>(&self, operation: &str, mut page_request: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(String) -> reqwest::RequestBuilder,
    {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, || page_request(page_value.clone()))
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GithubApi for GithubApiClient {
    async fn authenticated_login(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Viewer {
            login: String,
        }

        let viewer: Viewer = self
            .request_json("resolve bot login", || self.http.get(self.url("/user")))
            .await?;
        Ok(viewer.login)
    }

    async fn list_notifications(&self) -> Result<Vec<GithubNotification>> {
        let url = self.url("/notifications");
        self.paginate("list notifications", |page| {
            self.http.get(&url).query(&[
                ("all", "false"),
                ("per_page", "100"),
                ("page", page.as_str()),
            ])
        })
        .await
    }

    async fn mark_notifications_read(&self, last_read_at: &str) -> Result<()> {
        let payload = json!({ "last_read_at": last_read_at, "read": true });
        self.request_ok("mark notifications read", || {
            self.http.put(self.url("/notifications")).json(&payload)
        })
        .await
    }

    async fn issue_comment(&self, repo: &RepoRef, comment_id: u64) -> Result<GithubIssueComment> {
        let url = self.repo_url(repo, &format!("/issues/comments/{comment_id}"));
        self.request_json("read issue comment", || self.http.get(&url))
            .await
    }

    async fn list_issue_comments(&self, issue: &IssueRef) -> Result<Vec<GithubIssueComment>> {
        let url = self.repo_url(&issue.repo, &format!("/issues/{}/comments", issue.number));
        self.paginate("list issue comments", |page| {
            self.http
                .get(&url)
                .query(&[("per_page", "100"), ("page", page.as_str())])
        })
        .await
    }

    async fn create_issue_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        let url = self.repo_url(&issue.repo, &format!("/issues/{}/comments", issue.number));
        let payload = json!({ "body": body });
        self.request_ok("create issue comment", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn repository(&self, repo: &RepoRef) -> Result<GithubRepository> {
        let url = self.repo_url(repo, "");
        self.request_json("read repository", || self.http.get(&url))
            .await
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool> {
        let url = self.repo_url(repo, &format!("/branches/{}", urlencoding::encode(branch)));
        self.request_presence("read branch", || self.http.get(&url))
            .await
    }

    async fn org_membership(&self, org: &str, login: &str) -> Result<Option<OrgMembership>> {
        let url = self.url(&format!(
            "/orgs/{}/memberships/{}",
            urlencoding::encode(org),
            urlencoding::encode(login)
        ));
        self.request_optional_json("read organization membership", || self.http.get(&url))
            .await
    }

    async fn is_starred(&self, repo: &RepoRef) -> Result<bool> {
        let url = self.url(&format!("/user/starred/{}/{}", repo.owner, repo.name));
        self.request_presence("check star", || self.http.get(&url))
            .await
    }

    async fn star(&self, repo: &RepoRef) -> Result<()> {
        let url = self.url(&format!("/user/starred/{}/{}", repo.owner, repo.name));
        self.request_ok("star repository", || {
            self.http
                .put(&url)
                .header(reqwest::header::CONTENT_LENGTH, "0")
        })
        .await
    }

    async fn follow_user(&self, login: &str) -> Result<u16> {
        let url = self.url(&format!("/user/following/{}", urlencoding::encode(login)));
        let response = self
            .send_with_retry("follow user", || {
                self.http
                    .put(&url)
                    .header(reqwest::header::CONTENT_LENGTH, "0")
            })
            .await?;
        Ok(response.status().as_u16())
    }

    async fn file_contents(&self, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(repo, &format!("/contents/{}", path.trim_start_matches('/')));
        let Some(file) = self
            .request_optional_json::<GithubContentResponse, _>("read file contents", || {
                self.http.get(&url)
            })
            .await?
        else {
            return Ok(None);
        };
        let Some(content) = file.content else {
            return Ok(Some(String::new()));
        };
        match file.encoding.as_deref() {
            Some("base64") => {
                let compact = content
                    .chars()
                    .filter(|ch| !ch.is_whitespace())
                    .collect::<String>();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .with_context(|| format!("invalid base64 content for {path}"))?;
                String::from_utf8(bytes)
                    .map(Some)
                    .with_context(|| format!("{path} is not valid utf-8"))
            }
            Some(other) if !other.is_empty() => bail!("unsupported encoding '{other}' for {path}"),
            _ => Ok(Some(content)),
        }
    }

    async fn user_email(&self, login: &str) -> Result<Option<String>> {
        let url = self.url(&format!("/users/{}", urlencoding::encode(login)));
        let profile: GithubUserProfile = self
            .request_json("read user profile", || self.http.get(&url))
            .await?;
        Ok(profile.public_email())
    }
}
