//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::PartitionError;

/// A cancellation signal shared across tasks: an externally settable flag
/// plus an optional deadline. Work polls it at recursion and task boundaries;
/// nothing is interrupted mid-step.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the cancellation flag for this token and everything derived
    /// from it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns [`PartitionError::Canceled`] once the token has fired.
    pub fn check(&self) -> Result<(), PartitionError> {
        if self.is_canceled() {
            Err(PartitionError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Derives a token sharing this one's flag, with its deadline tightened
    /// to at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let new_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => existing.min(new_deadline),
            None => new_deadline,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }
}
