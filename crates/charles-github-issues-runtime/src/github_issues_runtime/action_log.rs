use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use charles_core::current_rfc3339_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Isolated log of one Action: `<logs_dir>/<action_id>.log`, mirrored to tracing.
pub struct ActionLog {
    action_id: String,
    address: String,
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog")
            .field("action_id", &self.action_id)
            .field("address", &self.address)
            .field("path", &self.path)
            .finish()
    }
}

pub fn action_log_address(logs_base_url: &str, action_id: &str) -> String {
    format!("{}/{action_id}.log", logs_base_url.trim_end_matches('/'))
}

impl ActionLog {
    pub fn open(logs_dir: &Path, action_id: &str, logs_base_url: &str) -> Result<Self> {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("failed to create {}", logs_dir.display()))?;
        let path = logs_dir.join(format!("{action_id}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self {
            action_id: action_id.to_string(),
            address: action_log_address(logs_base_url, action_id),
            path: Some(path),
            file: Some(Mutex::new(file)),
        })
    }

    /// Log that only reaches tracing; used when the file sink cannot be opened.
    pub fn detached(action_id: &str, logs_base_url: &str) -> Self {
        Self {
            action_id: action_id.to_string(),
            address: action_log_address(logs_base_url, action_id),
            path: None,
            file: None,
        }
    }

    /// Open the file sink, falling back to a tracing-only log.
    pub fn open_or_detached(logs_dir: &Path, action_id: &str, logs_base_url: &str) -> Self {
        match Self::open(logs_dir, action_id, logs_base_url) {
            Ok(log) => log,
            Err(error) => {
                tracing::warn!(action_id, "action log file unavailable: {error:#}");
                Self::detached(action_id, logs_base_url)
            }
        }
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Public link to this log, carried by progress and failure replies.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref());
    }

    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(action_id = %self.action_id, "{message}"),
            LogLevel::Warn => tracing::warn!(action_id = %self.action_id, "{message}"),
            LogLevel::Error => tracing::error!(action_id = %self.action_id, "{message}"),
        }
        let Some(file) = &self.file else {
            return;
        };
        let line = format!("{} [{}] {message}", current_rfc3339_utc(), level.as_str());
        let Ok(mut file) = file.lock() else {
            return;
        };
        if let Err(error) = writeln!(file, "{line}") {
            tracing::warn!(action_id = %self.action_id, "failed to write action log: {error}");
        }
    }
}
