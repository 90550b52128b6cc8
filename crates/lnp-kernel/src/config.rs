//! Engine configuration.
//!
//! Loaded once at startup from TOML and shared read-only afterwards.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! ordering_regime = "timestamp"
//! retry_max_attempts = 5
//!
//! [store]
//! journal_mode = "wal"
//!
//! [capabilities]
//! canadian_npas = ["204", "403"]
//! ```

use crate::sequence::OrderingRegime;
use crate::tn::TelephoneNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
pub const DEFAULT_LOOKUP_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub ordering_regime: OrderingRegime,
    /// Run inside the caller's open transaction (as a savepoint) instead of
    /// opening one per submission.
    pub participate_in_ambient_transaction: bool,
    pub retry_max_attempts: u32,
    /// Linear backoff unit between duplicate-correlation retries.
    pub retry_backoff_ms: u64,
    pub lookup_chunk_size: usize,
    pub store: StoreConfig,
    pub capabilities: Capabilities,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ordering_regime: OrderingRegime::Token,
            participate_in_ambient_transaction: false,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            lookup_chunk_size: DEFAULT_LOOKUP_CHUNK_SIZE,
            store: StoreConfig::default(),
            capabilities: Capabilities::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.lookup_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "lookup_chunk_size must be at least 1".to_string(),
            ));
        }
        for npa in &self.capabilities.canadian_npas {
            if npa.len() != 3 || !npa.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "canadian_npas entry is not a three-digit NPA: {npa:?}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::Wal,
        }
    }
}

/// Read-only registry capability flags handed to the splitter and persister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Capabilities {
    pub canadian_npas: BTreeSet<String>,
    pub simple_port_indicator: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            canadian_npas: BTreeSet::new(),
            simple_port_indicator: true,
        }
    }
}

impl Capabilities {
    pub fn is_canadian(&self, tn: &TelephoneNumber) -> bool {
        self.canadian_npas.contains(&tn.npa())
    }

    /// Whether simple-port indicators may be stored for this TN.
    pub fn keeps_simple_port_indicator(&self, tn: &TelephoneNumber) -> bool {
        self.simple_port_indicator && !self.is_canadian(tn)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
