//! Persistence for monitor state.
//!
//! Storage is an injected capability so the core runs against an
//! in-memory stub in tests. Two blobs are kept: the closure history and
//! the statistics snapshot. Missing or corrupt data hydrates to empty
//! rather than failing startup.

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PersistedState;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Trait for monitor state persistence backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load persisted state. Implementations return an empty state when
    /// nothing usable exists.
    async fn load(&self) -> Result<PersistedState>;

    /// Write persisted state.
    async fn save(&self, state: &PersistedState) -> Result<()>;
}
