use std::time::Duration;

use anyhow::{bail, Result};
use charles_core::LogRotationPolicy;
use charles_github_issues_runtime::{BotRuntimeConfig, SmtpSettings, TwitterCredentials};

use crate::cli_args::Cli;

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Validate parsed arguments and turn them into the runtime configuration.
pub fn build_runtime_config(cli: &Cli) -> Result<BotRuntimeConfig> {
    let token = cli.github_token.trim();
    if token.is_empty() {
        bail!("--github-token (or CHARLES_GITHUB_TOKEN) must not be empty");
    }
    for (flag, url) in [
        ("--github-api-base", cli.github_api_base.as_str()),
        ("--index-endpoint", cli.index_endpoint.as_str()),
        ("--logs-base-url", cli.logs_base_url.as_str()),
    ] {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("{flag} must be an http(s) url, got '{url}'");
        }
    }

    let twitter_parts = [
        &cli.twitter_consumer_key,
        &cli.twitter_consumer_secret,
        &cli.twitter_access_token,
        &cli.twitter_access_token_secret,
    ];
    let configured = twitter_parts
        .iter()
        .filter(|part| non_blank(part.as_deref()).is_some())
        .count();
    let twitter = TwitterCredentials::from_parts(
        non_blank(cli.twitter_consumer_key.as_deref()),
        non_blank(cli.twitter_consumer_secret.as_deref()),
        non_blank(cli.twitter_access_token.as_deref()),
        non_blank(cli.twitter_access_token_secret.as_deref()),
    );
    if twitter.is_none() && configured > 0 {
        tracing::warn!(
            configured,
            "incomplete twitter credentials, tweeting is disabled"
        );
    }

    let smtp = SmtpSettings::from_parts(
        cli.smtp_host.clone(),
        cli.smtp_port,
        cli.smtp_username.clone(),
        cli.smtp_password.clone(),
        cli.smtp_from.clone(),
    );
    let smtp_configured = [&cli.smtp_host, &cli.smtp_username, &cli.smtp_password]
        .iter()
        .any(|part| non_blank(part.as_deref()).is_some());
    if smtp.is_none() && smtp_configured {
        tracing::warn!("incomplete smtp settings, follow-up emails are disabled");
    }

    Ok(BotRuntimeConfig {
        api_base: cli.github_api_base.trim().to_string(),
        token: token.to_string(),
        bot_login: non_blank(cli.bot_login.as_deref())
            .map(|login| login.trim_start_matches('@').to_string()),
        poll_interval: Duration::from_secs(cli.poll_interval_seconds),
        poll_once: cli.poll_once,
        max_concurrent_actions: cli.max_concurrent_actions,
        action_timeout: (cli.action_timeout_seconds > 0)
            .then(|| Duration::from_secs(cli.action_timeout_seconds)),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        logs_dir: cli.logs_dir.clone(),
        logs_base_url: cli.logs_base_url.trim().to_string(),
        ledger_rotation: LogRotationPolicy::new(cli.ledger_max_bytes, cli.ledger_max_files),
        index_endpoint: cli.index_endpoint.trim().to_string(),
        crawl_retry_attempts: cli.crawl_retry_attempts,
        crawl_max_pages: cli.crawl_max_pages,
        twitter,
        smtp,
    })
}
