//! Cancellation/deadline handle threaded into the VM's dispatch loop.
//!
//! Execution is single-threaded and cooperative: the VM polls this handle
//! between opcodes, the sole suspension/abort point. Mirrors the shape of
//! `SandboxOptions::timeout_ms` (`sandbox/types.rs`), widened to also
//! support external cancellation via a shared flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// No deadline, not cancellable from outside.
    pub fn none() -> Self {
        Self { deadline: None, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// A handle any holder can use to cancel this context's execution from
    /// outside the dispatch loop (e.g. a host-side watchdog thread).
    pub fn canceller(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Polled once per opcode; true means the VM must abort with `Timeout`.
    pub fn expired(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_expires() {
        assert!(!Context::none().expired());
    }

    #[test]
    fn expired_timeout_reports_expired() {
        let ctx = Context::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.expired());
    }

    #[test]
    fn external_cancel_reports_expired() {
        let ctx = Context::none();
        ctx.cancel();
        assert!(ctx.expired());
    }
}
