//! Runtime settings for documents and sessions.
//!
//! Settings come from TOML text (every key optional) and may be overridden
//! per process through `PROPSYNC_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::document::HoldPolicy;
use crate::error::ConfigError;

/// Document and serialization defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Title of a new document.
    pub default_title: String,
    /// Policy used by [`crate::document::Document::hold_default`].
    pub hold_policy: HoldPolicy,
    /// Whether binary payloads travel as side buffers rather than inline
    /// base64.
    pub deferred_buffers: bool,
    /// Whether a patch naming a model this document used to hold is dropped
    /// (logged) instead of failing.
    pub drop_stale_patches: bool,
    /// Whether new models get UUIDs instead of process-serial ids, for peers
    /// that both mint models.
    pub unique_ids: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_title: "Untitled".to_string(),
            hold_policy: HoldPolicy::Combine,
            deferred_buffers: true,
            drop_stale_patches: true,
            unique_ids: false,
        }
    }
}

const TITLE_VAR: &str = "PROPSYNC_DEFAULT_TITLE";
const HOLD_VAR: &str = "PROPSYNC_HOLD_POLICY";
const DEFERRED_VAR: &str = "PROPSYNC_DEFERRED_BUFFERS";
const DROP_STALE_VAR: &str = "PROPSYNC_DROP_STALE_PATCHES";
const UNIQUE_IDS_VAR: &str = "PROPSYNC_UNIQUE_IDS";

impl Settings {
    /// Parses settings from TOML. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] when the text is not valid TOML or a key
    /// has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `PROPSYNC_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when a variable holds an unusable value.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(title) = lookup(TITLE_VAR) {
            self.default_title = title;
        }
        if let Some(value) = lookup(HOLD_VAR) {
            self.hold_policy = value
                .parse()
                .map_err(|_: String| ConfigError::Env { var: HOLD_VAR, value })?;
        }
        if let Some(value) = lookup(DEFERRED_VAR) {
            self.deferred_buffers = parse_flag(DEFERRED_VAR, value)?;
        }
        if let Some(value) = lookup(DROP_STALE_VAR) {
            self.drop_stale_patches = parse_flag(DROP_STALE_VAR, value)?;
        }
        if let Some(value) = lookup(UNIQUE_IDS_VAR) {
            self.unique_ids = parse_flag(UNIQUE_IDS_VAR, value)?;
        }
        Ok(self)
    }
}

fn parse_flag(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { var, value }),
    }
}
