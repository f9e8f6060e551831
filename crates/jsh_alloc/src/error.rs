use std::io;
use std::path::PathBuf;

use crate::ProviderKind;

/// Why a provider could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum ProviderInitError {
    #[error("no {0} allocator support")]
    Unavailable(ProviderKind),
    #[error("cannot open allocation log {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to init hybrid allocator: {0}")]
    PoolInit(String),
    #[error("failed to init external heap {name}: {reason}")]
    Foreign { name: String, reason: String },
}
