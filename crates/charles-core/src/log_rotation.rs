use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

/// Size limit of the action ledger and how many rotated copies survive.
///
/// `max_files` counts the live file, so `max_files = 3` keeps `actions.jsonl`,
/// `actions.jsonl.1` and `actions.jsonl.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl LogRotationPolicy {
    /// Zero values mean "use the default".
    pub fn new(max_bytes: u64, max_files: usize) -> Self {
        let defaults = Self::default();
        Self {
            max_bytes: Some(max_bytes).filter(|value| *value > 0).unwrap_or(defaults.max_bytes),
            max_files: Some(max_files).filter(|value| *value > 0).unwrap_or(defaults.max_files),
        }
    }

    fn overflows(self, current: u64, incoming: usize) -> bool {
        let incoming = u64::try_from(incoming).unwrap_or(u64::MAX);
        self.max_bytes > 0 && current.saturating_add(incoming) > self.max_bytes
    }
}

/// Append `line` plus a newline to `path`, rotating first when the write
/// would push the file past `policy.max_bytes`.
pub fn append_line_with_rotation(path: &Path, line: &str, policy: LogRotationPolicy) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let current = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == ErrorKind::NotFound => 0,
        Err(error) => {
            return Err(error).with_context(|| format!("failed to stat {}", path.display()));
        }
    };
    if current > 0 && policy.overflows(current, line.len() + 1) {
        rotate(path, policy.max_files)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))
}

fn backup_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shift `path.N-1` to `path.N` down to `path` itself; the oldest copy falls off.
fn rotate(path: &Path, max_files: usize) -> Result<()> {
    let oldest = max_files.saturating_sub(1);
    if oldest == 0 {
        return fs::remove_file(path)
            .with_context(|| format!("failed to truncate {}", path.display()));
    }

    let stale = backup_path(path, oldest);
    if stale.exists() {
        fs::remove_file(&stale).with_context(|| format!("failed to drop {}", stale.display()))?;
    }
    for generation in (1..=oldest).rev() {
        let from = match generation {
            1 => path.to_path_buf(),
            _ => backup_path(path, generation - 1),
        };
        if from.exists() {
            let to = backup_path(path, generation);
            fs::rename(&from, &to).with_context(|| {
                format!("failed to move {} to {}", from.display(), to.display())
            })?;
        }
    }
    Ok(())
}
