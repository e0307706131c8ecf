use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RelevanceError, Result};

/// Cooperative cancellation flag shared between a caller and a running request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RelevanceError::Cancelled)
        } else {
            Ok(())
        }
    }
}
