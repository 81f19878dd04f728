#![forbid(unsafe_code)]

//! Startup configuration for the dual-mount bootstrap.
//!
//! [`BootstrapConfig`] carries the anchor catalog and the cutover tuning as
//! plain data. With the `bootstrap-config` feature it can be loaded from TOML
//! or JSON at startup:
//!
//! ```toml
//! # dualmount.toml
//! cutover_timeout_ms = 750
//! strict_anchors = false
//!
//! [[anchors]]
//! id = "bottom-nav"
//! required = true
//!
//! [[anchors]]
//! id = "modal-overlay"
//! ```
//!
//! ```rust,ignore
//! let config = BootstrapConfig::from_toml_file("dualmount.toml")?;
//! ```
//!
//! # Defaults
//!
//! `BootstrapConfig::default()` is the standard catalog with a 500ms cutover
//! timeout.

#[cfg(feature = "bootstrap-config")]
use std::path::Path;

#[cfg(feature = "bootstrap-config")]
use serde::{Deserialize, Serialize};

use dualmount_core::AnchorCatalog;
use web_time::Duration;

/// Default bound on how long a cutover waits for the old owner to release.
pub const DEFAULT_CUTOVER_TIMEOUT_MS: u64 = 500;

/// Default number of cutover records kept for inspection.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "bootstrap-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "bootstrap-config", serde(default))]
pub struct BootstrapConfig {
    /// Closed set of anchors registered at startup.
    pub anchors: AnchorCatalog,

    /// Milliseconds a cutover waits before forcing the old owner out.
    pub cutover_timeout_ms: u64,

    /// Treat operations on undeclared anchors as fatal.
    pub strict_anchors: bool,

    /// Bound on the cutover journal.
    pub journal_capacity: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            anchors: AnchorCatalog::standard(),
            cutover_timeout_ms: DEFAULT_CUTOVER_TIMEOUT_MS,
            strict_anchors: cfg!(debug_assertions),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub fn cutover_timeout(&self) -> Duration {
        Duration::from_millis(self.cutover_timeout_ms)
    }

    #[must_use]
    pub fn with_anchors(mut self, anchors: AnchorCatalog) -> Self {
        self.anchors = anchors;
        self
    }

    #[must_use]
    pub fn with_cutover_timeout(mut self, timeout: Duration) -> Self {
        self.cutover_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_strict_anchors(mut self, strict: bool) -> Self {
        self.strict_anchors = strict;
        self
    }

    /// Load from a TOML string.
    #[cfg(feature = "bootstrap-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "bootstrap-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "bootstrap-config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "bootstrap-config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Check the configuration for defects.
    ///
    /// Returns a list of problems. An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.anchors.is_empty() {
            errors.push("anchors: catalog declares no anchors".to_string());
        }
        for id in self.anchors.duplicates() {
            errors.push(format!("anchors: {id} declared more than once"));
        }
        if self.cutover_timeout_ms == 0 {
            errors.push("cutover_timeout_ms must be > 0".to_string());
        }
        if self.journal_capacity == 0 {
            errors.push("journal_capacity must be > 0".to_string());
        }

        errors
    }

    /// [`Self::validate`] as a `Result`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

/// Errors that can occur when loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bootstrap config: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },

    #[cfg(feature = "bootstrap-config")]
    #[error("I/O error reading config: {0}")]
    Io(#[source] std::io::Error),

    #[cfg(feature = "bootstrap-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[source] toml::de::Error),

    #[cfg(feature = "bootstrap-config")]
    #[error("JSON parse error: {0}")]
    Json(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmount_core::{AnchorId, AnchorSpec};

    #[test]
    fn default_is_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.cutover_timeout(), Duration::from_millis(500));
        assert_eq!(config.anchors, AnchorCatalog::standard());
    }

    #[test]
    fn validate_catches_zero_timeout() {
        let mut config = BootstrapConfig::default();
        config.cutover_timeout_ms = 0;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("cutover_timeout_ms")));
    }

    #[test]
    fn validate_catches_zero_journal_capacity() {
        let mut config = BootstrapConfig::default();
        config.journal_capacity = 0;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("journal_capacity")));
    }

    #[test]
    fn validate_catches_duplicate_anchor() {
        let config = BootstrapConfig::default().with_anchors(AnchorCatalog::new(vec![
            AnchorSpec::required(AnchorId::FAB),
            AnchorSpec::optional(AnchorId::FAB),
        ]));
        let errors = config.validate();
        assert_eq!(errors, vec!["anchors: fab declared more than once".to_string()]);
    }

    #[test]
    fn validated_reports_every_problem() {
        let mut config = BootstrapConfig::default().with_anchors(AnchorCatalog::default());
        config.journal_capacity = 0;
        let err = config.validated().unwrap_err();
        let ConfigError::Invalid { problems } = &err else {
            panic!("expected Invalid, got {err:?}");
        };
        assert_eq!(problems.len(), 2);
        assert!(err.to_string().starts_with("invalid bootstrap config: anchors:"));
    }

    #[test]
    fn timeout_builder_round_trips_millis() {
        let config = BootstrapConfig::default().with_cutover_timeout(Duration::from_millis(1250));
        assert_eq!(config.cutover_timeout_ms, 1250);
    }
}
