use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::app::{Result, RivuletError};
use crate::domain::OwnerPrefs;

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag, so a caller can keep one half and hand
/// the other to a worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RivuletError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a request needs to know about its caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub owner_uid: i64,
    pub prefs: OwnerPrefs,
    pub now: DateTime<Utc>,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(owner_uid: i64, prefs: OwnerPrefs) -> Self {
        Self {
            owner_uid,
            prefs,
            now: Utc::now(),
            cancel: CancelToken::new(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}
