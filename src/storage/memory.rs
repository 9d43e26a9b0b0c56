//! In-memory state store for tests and ephemeral runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::PersistedState;
use crate::storage::StateStore;

/// State store backed by process memory. Saves can be made to fail for
/// exercising persistence-recovery paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
    failing_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Current stored state.
    pub fn snapshot(&self) -> PersistedState {
        self.state.lock().expect("state lock poisoned").clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<PersistedState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let remaining = self.failing_saves.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_saves.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::persistence("simulated storage failure"));
        }
        *self.state.lock().expect("state lock poisoned") = state.clone();
        Ok(())
    }
}
