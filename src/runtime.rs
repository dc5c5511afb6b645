//! Running checks: the common checker interface, cooperative cancellation
//! and (feature `async`) running a check on a tokio blocking thread.
//!
//! ```text
//! run_check_with_deadline ──► spawn_blocking(checker.check())
//!           │                        ▲
//!           └─ sleep(deadline) ──► CancelFlag::cancel() (seen after each rule batch)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Result;
use crate::graph::TNGraph;
use crate::status::CheckStatus;

/// Shared cancellation flag, checked by the drivers at the same points as
/// the deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A consistency or controllability checker.
pub trait DcChecker {
    /// Initialize if needed and run to a verdict.
    fn check(&mut self) -> Result<CheckStatus>;

    fn status(&self) -> &CheckStatus;

    fn graph(&self) -> &TNGraph;

    fn set_cancel_flag(&mut self, flag: CancelFlag);
}

// ============================================================================
// Async runner
// ============================================================================

#[cfg(feature = "async")]
pub use self::tasks::{run_check, run_check_with_deadline};

#[cfg(feature = "async")]
mod tasks {
    use std::time::Duration;

    use tracing::{debug, warn};

    use super::{CancelFlag, DcChecker};
    use crate::status::CheckStatus;
    use crate::{Error, Result};

    /// Run `checker.check()` on the blocking pool. The checker is handed
    /// back with its status.
    pub async fn run_check<C>(mut checker: C) -> Result<(C, CheckStatus)>
    where
        C: DcChecker + Send + 'static,
    {
        let joined = tokio::task::spawn_blocking(move || {
            let status = checker.check();
            (checker, status)
        })
        .await
        .map_err(|e| Error::Runtime(format!("check task failed: {e}")))?;
        let (checker, status) = joined;
        Ok((checker, status?))
    }

    /// Like [`run_check`], cancelling the check once `deadline` elapses.
    /// A cancelled check ends with `CheckState::Cancelled`.
    pub async fn run_check_with_deadline<C>(mut checker: C, deadline: Duration) -> Result<(C, CheckStatus)>
    where
        C: DcChecker + Send + 'static,
    {
        let flag = CancelFlag::new();
        checker.set_cancel_flag(flag.clone());
        let watchdog = tokio::spawn({
            let flag = flag.clone();
            async move {
                tokio::time::sleep(deadline).await;
                warn!(deadline_ms = deadline.as_millis() as u64, "check deadline reached, cancelling");
                flag.cancel();
            }
        });
        let result = run_check(checker).await;
        watchdog.abort();
        debug!(cancelled = flag.is_cancelled(), "check task joined");
        result
    }
}
