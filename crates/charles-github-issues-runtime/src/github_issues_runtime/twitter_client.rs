use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use charles_core::current_unix_timestamp;
use charles_github_issues::github_transport_helpers::truncate_for_error;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use sha1::Sha1;

use super::bot_services::Tweeter;

const DEFAULT_TWITTER_API_BASE: &str = "https://api.twitter.com";

#[derive(Clone)]
/// OAuth 1.0a user-context credentials.
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl TwitterCredentials {
    /// All four values are required; `None` when any is missing or blank.
    pub fn from_parts(
        consumer_key: Option<String>,
        consumer_secret: Option<String>,
        access_token: Option<String>,
        access_token_secret: Option<String>,
    ) -> Option<Self> {
        let present = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Some(Self {
            consumer_key: present(consumer_key)?,
            consumer_secret: present(consumer_secret)?,
            access_token: present(access_token)?,
            access_token_secret: present(access_token_secret)?,
        })
    }
}

fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// HMAC-SHA1 signature of an OAuth 1.0a request.
pub fn oauth_signature(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String> {
    let mut encoded = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>();
    encoded.sort();
    let parameter_string = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let base_string = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&parameter_string)
    );
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
        .map_err(|_| anyhow!("failed to initialize oauth signer"))?;
    mac.update(base_string.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn oauth_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Posts tweets through the v2 API with OAuth 1.0a user context.
pub struct TwitterApiClient {
    http: reqwest::Client,
    api_base: String,
    credentials: TwitterCredentials,
}

impl TwitterApiClient {
    pub fn new(credentials: TwitterCredentials, request_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("charles-github-bot")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create twitter client")?;
        Ok(Self {
            http,
            api_base: DEFAULT_TWITTER_API_BASE.to_string(),
            credentials,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn authorization_header(&self, method: &str, url: &str) -> Result<String> {
        let mut params = vec![
            (
                "oauth_consumer_key".to_string(),
                self.credentials.consumer_key.clone(),
            ),
            ("oauth_nonce".to_string(), oauth_nonce()),
            (
                "oauth_signature_method".to_string(),
                "HMAC-SHA1".to_string(),
            ),
            (
                "oauth_timestamp".to_string(),
                current_unix_timestamp().to_string(),
            ),
            (
                "oauth_token".to_string(),
                self.credentials.access_token.clone(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        let signature = oauth_signature(
            method,
            url,
            &params,
            &self.credentials.consumer_secret,
            &self.credentials.access_token_secret,
        )?;
        params.push(("oauth_signature".to_string(), signature));
        params.sort();
        let fields = params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", percent_encode(key), percent_encode(value)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {fields}"))
    }
}

#[async_trait]
impl Tweeter for TwitterApiClient {
    async fn tweet(&self, message: &str) -> Result<()> {
        let url = format!("{}/2/tweets", self.api_base);
        let authorization = self.authorization_header("POST", &url)?;
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&json!({ "text": message }))
            .send()
            .await
            .context("twitter request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "twitter post failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 400)
            );
        }
        Ok(())
    }
}
