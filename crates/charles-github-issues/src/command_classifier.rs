use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::english::English;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates supported `CommandCategory` values.
pub enum CommandCategory {
    Hello,
    IndexSite,
    IndexPage,
    IndexSitemap,
    DeleteIndex,
    DeletePage,
    Unknown,
}

impl CommandCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::IndexSite => "indexsite",
            Self::IndexPage => "indexpage",
            Self::IndexSitemap => "indexsitemap",
            Self::DeleteIndex => "deleteindex",
            Self::DeletePage => "deletepage",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Self::Unknown
    }
}

/// A localized command vocabulary and its reply templates.
pub trait Language: Send + Sync {
    fn name(&self) -> &'static str;

    /// Categorize a comment body addressed to `bot_login`.
    fn categorize(&self, body: &str, bot_login: &str) -> CommandCategory;

    /// Template for a response key such as `hello.comment`.
    fn response(&self, key: &str) -> Option<&'static str>;
}

#[derive(Clone)]
/// Outcome of classification: the category plus the language that understood it.
pub struct Classification {
    pub category: CommandCategory,
    pub language: Arc<dyn Language>,
}

impl std::fmt::Debug for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classification")
            .field("category", &self.category)
            .field("language", &self.language.name())
            .finish()
    }
}

#[derive(Clone)]
pub struct CommandClassifier {
    languages: Vec<Arc<dyn Language>>,
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new(vec![Arc::new(English)])
    }
}

impl CommandClassifier {
    /// Languages are tried in order. An empty list falls back to English.
    pub fn new(languages: Vec<Arc<dyn Language>>) -> Self {
        if languages.is_empty() {
            return Self::default();
        }
        Self { languages }
    }

    /// The first language returning a known category wins; otherwise the
    /// command is `unknown` and answered in the first language.
    pub fn classify(&self, body: &str, bot_login: &str) -> Classification {
        for language in &self.languages {
            let category = language.categorize(body, bot_login);
            if !category.is_unknown() {
                return Classification {
                    category,
                    language: Arc::clone(language),
                };
            }
        }
        Classification {
            category: CommandCategory::Unknown,
            language: self.primary_language(),
        }
    }

    /// Language used when nothing was understood, e.g. for error replies.
    pub fn primary_language(&self) -> Arc<dyn Language> {
        self.languages
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(English) as Arc<dyn Language>)
    }
}
