//! Cooperative cancellation for long-running scans and searches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, TesseraError};

/// A cloneable cancellation handle with an optional deadline.
///
/// Loops that may touch every document (index backfill, KNN traversal,
/// exhaustive scans) call [`CancelToken::check`] periodically.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TesseraError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check a token every `every` iterations.
pub(crate) fn check_every(token: Option<&CancelToken>, step: usize, every: usize) -> Result<()> {
    match token {
        Some(t) if step % every == 0 => t.check(),
        _ => Ok(()),
    }
}
