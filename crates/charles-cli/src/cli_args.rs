use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "charles",
    about = "GitHub bot that indexes Github-hosted websites on request",
    version
)]
/// Command-line and environment surface of the `charles` binary.
pub struct Cli {
    #[arg(
        long = "github-token",
        env = "CHARLES_GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token of the bot account"
    )]
    pub github_token: String,

    #[arg(
        long = "github-api-base",
        env = "CHARLES_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "bot-login",
        env = "CHARLES_BOT_LOGIN",
        help = "Bot login; resolved from the token when omitted"
    )]
    pub bot_login: Option<String>,

    #[arg(
        long = "poll-interval-seconds",
        env = "CHARLES_POLL_INTERVAL_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Seconds between notification polls"
    )]
    pub poll_interval_seconds: u64,

    #[arg(
        long = "poll-once",
        env = "CHARLES_POLL_ONCE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Run one poll cycle, wait for the dispatched Actions, and exit"
    )]
    pub poll_once: bool,

    #[arg(
        long = "max-concurrent-actions",
        env = "CHARLES_MAX_CONCURRENT_ACTIONS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum number of Actions running at the same time"
    )]
    pub max_concurrent_actions: usize,

    #[arg(
        long = "action-timeout-seconds",
        env = "CHARLES_ACTION_TIMEOUT_SECONDS",
        default_value_t = 0,
        help = "Cancel an Action after this many seconds (0 disables the limit)"
    )]
    pub action_timeout_seconds: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "CHARLES_REQUEST_TIMEOUT_MS",
        default_value_t = 20_000,
        value_parser = parse_positive_u64,
        help = "Timeout of every outbound HTTP request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "CHARLES_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable github api failures (429/5xx/transport)"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "CHARLES_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base backoff delay in milliseconds for github api retries"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "logs-dir",
        env = "CHARLES_LOGS_DIR",
        default_value = ".charles/logs",
        help = "Directory for per-Action logs and the action ledger"
    )]
    pub logs_dir: PathBuf,

    #[arg(
        long = "logs-base-url",
        env = "CHARLES_LOGS_BASE_URL",
        default_value = "http://localhost:8080/logs",
        help = "Public URL under which the logs directory is served"
    )]
    pub logs_base_url: String,

    #[arg(
        long = "ledger-max-bytes",
        env = "CHARLES_LEDGER_MAX_BYTES",
        default_value_t = 10 * 1024 * 1024,
        help = "Rotate actions.jsonl once it exceeds this size in bytes"
    )]
    pub ledger_max_bytes: u64,

    #[arg(
        long = "ledger-max-files",
        env = "CHARLES_LEDGER_MAX_FILES",
        default_value_t = 5,
        help = "Rotated action ledger backups to keep"
    )]
    pub ledger_max_files: usize,

    #[arg(
        long = "index-endpoint",
        env = "CHARLES_INDEX_ENDPOINT",
        default_value = "http://localhost:9200",
        help = "Elasticsearch-compatible endpoint storing the indexed pages"
    )]
    pub index_endpoint: String,

    #[arg(
        long = "crawl-retry-attempts",
        env = "CHARLES_CRAWL_RETRY_ATTEMPTS",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Attempts per crawl before the indexing step fails"
    )]
    pub crawl_retry_attempts: usize,

    #[arg(
        long = "crawl-max-pages",
        env = "CHARLES_CRAWL_MAX_PAGES",
        default_value_t = 500,
        value_parser = parse_positive_usize,
        help = "Maximum pages collected by one site or sitemap crawl"
    )]
    pub crawl_max_pages: usize,

    #[arg(
        long = "twitter-consumer-key",
        env = "CHARLES_TWITTER_CONSUMER_KEY",
        hide_env_values = true,
        help = "Twitter consumer key; tweeting needs all four twitter credentials"
    )]
    pub twitter_consumer_key: Option<String>,

    #[arg(
        long = "twitter-consumer-secret",
        env = "CHARLES_TWITTER_CONSUMER_SECRET",
        hide_env_values = true,
        help = "Twitter consumer secret"
    )]
    pub twitter_consumer_secret: Option<String>,

    #[arg(
        long = "twitter-access-token",
        env = "CHARLES_TWITTER_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Twitter access token of the bot account"
    )]
    pub twitter_access_token: Option<String>,

    #[arg(
        long = "twitter-access-token-secret",
        env = "CHARLES_TWITTER_ACCESS_TOKEN_SECRET",
        hide_env_values = true,
        help = "Twitter access token secret of the bot account"
    )]
    pub twitter_access_token_secret: Option<String>,

    #[arg(
        long = "smtp-host",
        env = "CHARLES_SMTP_HOST",
        help = "SMTP relay for follow-up emails; emailing needs host, username and password"
    )]
    pub smtp_host: Option<String>,

    #[arg(
        long = "smtp-port",
        env = "CHARLES_SMTP_PORT",
        default_value_t = 587,
        help = "STARTTLS port of the SMTP relay"
    )]
    pub smtp_port: u16,

    #[arg(long = "smtp-username", env = "CHARLES_SMTP_USERNAME", help = "SMTP login")]
    pub smtp_username: Option<String>,

    #[arg(
        long = "smtp-password",
        env = "CHARLES_SMTP_PASSWORD",
        hide_env_values = true,
        help = "SMTP password"
    )]
    pub smtp_password: Option<String>,

    #[arg(
        long = "smtp-from",
        env = "CHARLES_SMTP_FROM",
        help = "Sender mailbox of follow-up emails; defaults to the SMTP username"
    )]
    pub smtp_from: Option<String>,
}
