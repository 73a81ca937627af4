use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHARLES_YML_PATH: &str = ".charles.yml";
const DEFAULT_DRIVER: &str = "chrome";

#[derive(Debug, Error)]
/// Enumerates supported `CharlesYmlError` values.
pub enum CharlesYmlError {
    #[error("malformed .charles.yml: {0}")]
    Malformed(#[from] serde_yaml::Error),
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-repository bot configuration read from `.charles.yml`.
pub struct CharlesYml {
    #[serde(default)]
    pub commanders: Vec<String>,
    #[serde(default)]
    pub tweet: bool,
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for CharlesYml {
    fn default() -> Self {
        Self {
            commanders: Vec::new(),
            tweet: false,
            driver: default_driver(),
        }
    }
}

impl CharlesYml {
    /// Parse file contents. A missing or blank file yields the defaults.
    pub fn parse(contents: Option<&str>) -> Result<Self, CharlesYmlError> {
        let Some(contents) = contents.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(Self::default());
        };
        let mut parsed: Self = serde_yaml::from_str(contents)?;
        parsed.commanders = parsed
            .commanders
            .into_iter()
            .map(|login| login.trim().trim_start_matches('@').to_string())
            .filter(|login| !login.is_empty())
            .collect();
        if parsed.driver.trim().is_empty() {
            parsed.driver = default_driver();
        }
        Ok(parsed)
    }

    /// GitHub logins are case-insensitive.
    pub fn is_commander(&self, login: &str) -> bool {
        self.commanders
            .iter()
            .any(|commander| commander.eq_ignore_ascii_case(login.trim()))
    }
}
