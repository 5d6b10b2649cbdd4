//! Engine configuration file handling.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration and older files keep loading when fields are added.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::SceneGraftError;
use crate::namer::NamingRules;
use crate::registry::DuplicatePolicy;
use crate::tokens::{IDENTITY_TOKEN, PATH_TOKEN, TokenSet};

/// Placeholder markers rewritten in parameter trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub path_marker: String,
    pub identity_marker: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            path_marker: PATH_TOKEN.to_string(),
            identity_marker: IDENTITY_TOKEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub duplicate_policy: DuplicatePolicy,
}

/// Installation workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Description file inside an unpacked package
    pub data_file: String,
    /// How long to wait for the host to confirm a collection switch
    pub switch_timeout_ms: u64,
    /// Name given to the host's default scene until it is removed
    pub placeholder_scene_name: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            data_file: "data.json".to_string(),
            switch_timeout_ms: 5_000,
            placeholder_scene_name: "Scene Import Successful - delete this Scene".to_string(),
        }
    }
}

impl InstallConfig {
    pub fn switch_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokens: TokenConfig,
    pub registry: RegistryConfig,
    pub naming: NamingRules,
    pub install: InstallConfig,
}

impl EngineConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.tokens.path_marker.is_empty() {
            return Err(SceneGraftError::config("Path marker must not be empty"));
        }
        if self.tokens.identity_marker.is_empty() {
            return Err(SceneGraftError::config("Identity marker must not be empty"));
        }
        if self.tokens.path_marker == self.tokens.identity_marker {
            return Err(SceneGraftError::config("Path and identity markers must differ"));
        }

        if self.naming.first_ordinal == 0 || self.naming.first_ordinal > 1_000_000 {
            return Err(SceneGraftError::config(
                "First ordinal must be between 1 and 1000000",
            ));
        }
        if self.naming.placeholder_stem.trim().is_empty() {
            return Err(SceneGraftError::config("Placeholder stem must be specified"));
        }
        if crate::namer::sanitize_stem(&self.naming.placeholder_stem, "") != self.naming.placeholder_stem
        {
            return Err(SceneGraftError::config(
                "Placeholder stem can only contain letters, numbers, '_' and '-'",
            ));
        }
        if self.naming.extension.is_empty()
            || !self
                .naming
                .extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(SceneGraftError::config("Extension must be non-empty and alphanumeric"));
        }

        if self.install.data_file.trim().is_empty() {
            return Err(SceneGraftError::config("Install data file must be specified"));
        }
        if Path::new(&self.install.data_file).is_absolute() {
            return Err(SceneGraftError::config(
                "Install data file must be relative to the package directory",
            ));
        }
        if self.install.switch_timeout_ms == 0 {
            return Err(SceneGraftError::config("Switch timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Token set for one build with the configured markers
    pub fn token_set(&self, base_dir: impl Into<String>, identity: impl Into<String>) -> TokenSet {
        TokenSet::new(base_dir, identity).with_markers(
            self.tokens.path_marker.clone(),
            self.tokens.identity_marker.clone(),
        )
    }
}
