//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared between a caller and the query path. The
//! rewriter checks it between stages, and result draining checks it between
//! backend tuples. Timeouts are expressed as cancellation events: a token
//! constructed with a deadline cancels itself once the deadline passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Duration>,
}

impl CancelToken {
    /// A token that never fires on its own.
    pub fn none() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// A token that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: Some(timeout),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match self.deadline {
            Some(limit) if self.started.elapsed() > limit => {
                self.cancelled.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Return `Err(Cancelled)` if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Elapsed time since the token was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::none()
    }
}
