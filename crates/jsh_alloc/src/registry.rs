//! Runtime registry of provider variants.
//!
//! Availability is a runtime fact rather than a build flag, so a host can be
//! built with a reduced registry and the fallback chain exercised directly.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ProviderInitError;
use crate::{
    AllocatorProvider, ExternalProvider, HybridConfig, HybridProvider, LoggingProvider,
    ProviderHandle, ProviderKind, SystemProvider, TortureConfig, TortureProvider,
};

pub const DEFAULT_LOG_FILE: &str = "jsh-alloc-log.txt";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocConfig {
    pub provider: ProviderKind,
    /// Side channel of the logging provider.
    pub log_path: PathBuf,
    pub torture: TortureConfig,
    pub hybrid: HybridConfig,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Default,
            log_path: std::env::temp_dir().join(DEFAULT_LOG_FILE),
            torture: TortureConfig::default(),
            hybrid: HybridConfig::default(),
        }
    }
}

pub type ProviderFactory = Box<dyn Fn(&AllocConfig) -> Box<dyn AllocatorProvider>>;

pub struct ProviderRegistry {
    entries: Vec<(ProviderKind, ProviderFactory)>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Every variant this crate ships.
    pub fn standard() -> Self {
        let mut reg = Self::empty();
        reg.register(ProviderKind::Default, |_| Box::new(SystemProvider::new()));
        reg.register(ProviderKind::Logging, |cfg| {
            Box::new(LoggingProvider::to_file(cfg.log_path.clone()))
        });
        reg.register(ProviderKind::Torture, |cfg| {
            Box::new(TortureProvider::new(cfg.torture.policy()))
        });
        reg.register(ProviderKind::Hybrid, |cfg| {
            Box::new(HybridProvider::new(cfg.hybrid.clone()))
        });
        reg.register(ProviderKind::External, |_| Box::new(ExternalProvider::mimalloc()));
        reg
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register<F>(&mut self, kind: ProviderKind, factory: F) -> &mut Self
    where
        F: Fn(&AllocConfig) -> Box<dyn AllocatorProvider> + 'static,
    {
        self.entries.retain(|(k, _)| *k != kind);
        self.entries.push((kind, Box::new(factory)));
        self
    }

    pub fn remove(&mut self, kind: ProviderKind) -> &mut Self {
        self.entries.retain(|(k, _)| *k != kind);
        self
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.entries.iter().any(|(k, _)| *k == kind)
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        ProviderKind::PRIORITY
            .into_iter()
            .filter(|k| self.is_available(*k))
            .collect()
    }

    /// Variants to try for `requested`, in priority order: the requested one
    /// (if distinct) and then `Default` as the last resort.
    pub fn candidates(&self, requested: ProviderKind) -> Vec<ProviderKind> {
        ProviderKind::PRIORITY
            .into_iter()
            .filter(|k| *k == requested || *k == ProviderKind::Default)
            .collect()
    }

    /// Builds and initialises one provider.
    pub fn select(
        &self,
        kind: ProviderKind,
        config: &AllocConfig,
    ) -> Result<ProviderHandle, ProviderInitError> {
        let (_, factory) = self
            .entries
            .iter()
            .find(|(k, _)| *k == kind)
            .ok_or(ProviderInitError::Unavailable(kind))?;
        let mut provider = factory(config);
        provider.init()?;
        tracing::debug!(provider = %kind, "allocator provider initialised");
        Ok(ProviderHandle::new(provider))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builds a provider from the standard registry.
pub fn select(kind: ProviderKind, config: &AllocConfig) -> Result<ProviderHandle, ProviderInitError> {
    ProviderRegistry::standard().select(kind, config)
}
