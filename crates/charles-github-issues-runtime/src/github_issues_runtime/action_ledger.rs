use std::path::PathBuf;

use anyhow::{Context, Result};
use charles_core::{append_line_with_rotation, LogRotationPolicy};
use serde::Serialize;

use super::action_runner::ActionReport;

pub const ACTION_LEDGER_FILE: &str = "actions.jsonl";

#[derive(Serialize)]
struct LedgerLine<'a> {
    #[serde(flatten)]
    report: &'a ActionReport,
    duration_ms: u64,
}

/// NDJSON ledger with one summary line per finished Action.
pub(super) struct ActionLedger {
    path: PathBuf,
    policy: LogRotationPolicy,
}

impl ActionLedger {
    pub(super) fn open(path: PathBuf, policy: LogRotationPolicy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        Ok(Self { path, policy })
    }

    pub(super) fn append(&self, report: &ActionReport) -> Result<()> {
        let line = serde_json::to_string(&LedgerLine {
            report,
            duration_ms: report.completed_unix_ms.saturating_sub(report.started_unix_ms),
        })
        .context("failed to encode action report")?;
        append_line_with_rotation(&self.path, &line, self.policy)
    }
}
