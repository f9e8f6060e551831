use std::io;
use std::path::PathBuf;

use jsh_alloc::ProviderKind;
use thiserror::Error;

use crate::FailureKind;

/// Every candidate provider failed to produce a heap.
#[derive(Debug, Error)]
#[error("failed to create engine heap")]
pub struct HeapCreationError {
    pub requested: ProviderKind,
    /// One entry per candidate that was tried, in order.
    pub attempts: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open source file: {name}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read source file: {name}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("error in executing file {name}")]
    Execution { name: String, kind: FailureKind },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
