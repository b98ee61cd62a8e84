//! Word-suggestion configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options of the word-suggestion subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WordSuggestionsConfig {
    /// Master switch for the suggestion bar.
    pub enabled: bool,
    /// Learn from typed text as it is committed.
    pub auto_learn: bool,
    /// Insert/remove spaces around punctuation automatically.
    pub punctuation_assistance: bool,
    /// Match prefixes regardless of accents.
    pub accent_insensitive: bool,
    /// Maximum number of word choices shown.
    pub max_word_choices: usize,
    /// Suspend learning while the keyboard is locked visible.
    pub pause_learning_locked: bool,
}

impl Default for WordSuggestionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_learn: true,
            punctuation_assistance: true,
            accent_insensitive: true,
            max_word_choices: 5,
            pause_learning_locked: false,
        }
    }
}

impl WordSuggestionsConfig {
    pub fn load_toml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_toml(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
