//! Pluggable memory backends for the engine heap.
//!
//! A provider implements the allocate/reallocate/free triplet; the
//! [`ProviderRegistry`] decides at runtime which variants exist and builds
//! the active one behind a [`ProviderHandle`].

pub mod block;
mod error;
mod external;
mod hybrid;
mod logging;
mod provider;
mod registry;
mod stats;
mod system;
mod torture;

pub use error::ProviderInitError;
pub use external::{ExternalProvider, ForeignHeap, ForeignToken, MimallocHeap};
pub use hybrid::{HybridConfig, HybridProvider, PoolClass};
pub use logging::LoggingProvider;
pub use provider::{AllocatorProvider, Capabilities, ProviderHandle, ProviderKind};
pub use registry::{AllocConfig, DEFAULT_LOG_FILE, ProviderFactory, ProviderRegistry, select};
pub use stats::AllocStats;
pub use system::SystemProvider;
pub use torture::{DEFAULT_FAIL_EVERY, FailurePolicy, TortureConfig, TortureProvider};
