//! Cooperative cancellation on SIGINT/SIGTERM
//!
//! The handler only sets a flag. The pipeline checks it between artifacts, so
//! the artifact in flight always finishes its current transition and the
//! ledger stays consistent; remaining work is abandoned and the run lock is
//! released on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Install the process signal handler and return its flag
pub fn install() -> Result<CancelFlag, ctrlc::Error> {
    let flag = CancelFlag::new();
    let handle = flag.clone();
    ctrlc::set_handler(move || {
        info!("termination requested, finishing current artifact");
        handle.cancel();
    })?;
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear_and_latches() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());

        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());

        // Latched, never resets
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
