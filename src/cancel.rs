use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OcflError, Result};

/// Cooperative cancellation token. Clones share the same flag. Long-running operations
/// observe the token at their next I/O or channel interaction.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns `OcflError::Cancelled` if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(OcflError::Cancelled)
        } else {
            Ok(())
        }
    }
}
