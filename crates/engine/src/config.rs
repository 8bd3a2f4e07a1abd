//! Engine configuration via `pop.toml`
//!
//! Every key is optional. An empty file gives the defaults: strict mode taken
//! from `POP_STRICT_MODE`, audit trail enabled and unbounded.

use pop_core::{resolve_strict_mode, Error, LockManager, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "pop.toml";

/// Engine configuration
///
/// # Example
///
/// ```toml
/// # strict_mode = true
/// record_audit = true
/// audit_capacity = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Reject direct mutation while locked. `None` defers to `POP_STRICT_MODE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_mode: Option<bool>,
    /// Keep an audit record of every committed invocation
    #[serde(default = "default_record_audit")]
    pub record_audit: bool,
    /// Keep only the most recent N audit records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_capacity: Option<usize>,
}

fn default_record_audit() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mode: None,
            record_audit: default_record_audit(),
            audit_capacity: None,
        }
    }
}

impl EngineConfig {
    /// Config with strict mode forced on
    pub fn strict() -> Self {
        Self {
            strict_mode: Some(true),
            ..Self::default()
        }
    }

    /// Config with strict mode forced off
    pub fn permissive() -> Self {
        Self {
            strict_mode: Some(false),
            ..Self::default()
        }
    }

    /// Effective strict mode after consulting the environment
    pub fn resolved_strict_mode(&self) -> bool {
        resolve_strict_mode(self.strict_mode)
    }

    /// Build the lock manager this config describes
    pub fn lock_manager(&self) -> LockManager {
        LockManager::new(self.strict_mode)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Process engine configuration
#
# Strict mode: reject direct context mutation outside a process.
# When unset, POP_STRICT_MODE decides (1/true/yes/on), else permissive.
# strict_mode = true

# Record every committed invocation in the audit trail (default: true)
record_audit = true

# Keep only the most recent N audit records (default: unbounded)
# audit_capacity = 1000
"#
    }

    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse a config file
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the file if it cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }
}
