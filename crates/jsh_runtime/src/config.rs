use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use jsh_alloc::AllocConfig;
use serde::Deserialize;

use crate::ConfigError;

/// Host settings, read from an optional TOML file and then overridden by
/// command-line flags.
///
/// ```toml
/// [alloc]
/// provider = "torture"
/// torture = { fail_every = 50 }
///
/// [limits]
/// memory = "high"
/// timeout_ms = 2000
///
/// [debugger]
/// enabled = true
/// addr = "127.0.0.1:9091"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub alloc: AllocConfig,
    pub limits: LimitsConfig,
    pub debugger: DebuggerConfig,
}

impl HostConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLimit {
    #[default]
    Normal,
    High,
}

impl MemoryLimit {
    pub const NORMAL_BYTES: usize = 128 * 1024 * 1024;
    pub const HIGH_BYTES: usize = 2047 * 1024 * 1024;

    pub fn bytes(self) -> usize {
        match self {
            MemoryLimit::Normal => Self::NORMAL_BYTES,
            MemoryLimit::High => Self::HIGH_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub memory: MemoryLimit,
    /// Native stack budget for the engine; engine default when unset.
    pub stack_size: Option<usize>,
    /// Per-script execution budget; unlimited when unset or zero.
    pub timeout_ms: Option<u64>,
}

impl LimitsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    pub enabled: bool,
    pub addr: SocketAddr,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: jsh_debug::default_debug_addr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use jsh_alloc::{FailurePolicy, ProviderKind};

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = HostConfig::from_toml(Path::new("jsh.toml"), "").unwrap();
        assert_eq!(cfg.alloc.provider, ProviderKind::Default);
        assert_eq!(cfg.limits.memory.bytes(), MemoryLimit::NORMAL_BYTES);
        assert!(cfg.limits.timeout().is_none());
        assert!(!cfg.debugger.enabled);
        assert_eq!(cfg.debugger.addr.port(), 9091);
    }

    #[test]
    fn sections_parse() {
        let text = r#"
            [alloc]
            provider = "torture"
            torture = { fail_every = 7 }

            [limits]
            memory = "high"
            timeout_ms = 250

            [debugger]
            enabled = true
            addr = "127.0.0.1:4000"
        "#;
        let cfg = HostConfig::from_toml(Path::new("jsh.toml"), text).unwrap();
        assert_eq!(cfg.alloc.provider, ProviderKind::Torture);
        assert_eq!(cfg.alloc.torture.policy(), FailurePolicy::EveryNth(7));
        assert_eq!(cfg.limits.memory, MemoryLimit::High);
        assert_eq!(cfg.limits.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.debugger.addr.port(), 4000);
    }

    #[test]
    fn zero_timeout_means_unlimited() {
        let cfg = HostConfig::from_toml(Path::new("x"), "[limits]\ntimeout_ms = 0\n").unwrap();
        assert!(cfg.limits.timeout().is_none());
    }

    #[test]
    fn unknown_keys_are_rejected_with_path() {
        let err = HostConfig::from_toml(Path::new("bad.toml"), "[limits]\nfuel = 3\n").unwrap_err();
        assert!(err.to_string().starts_with("invalid config bad.toml"));
    }
}
