//! Suppression of realtime echoes of our own writes.
//!
//! The coordinator arms the latch right before a remote write that will
//! come back as a change notice. The realtime handler consumes it: an
//! armed latch swallows exactly one notice, a clear latch lets the notice
//! trigger a reload.
//!
//! Each arming gets its own generation. A failed write disarms with its
//! [`EchoToken`], which cannot clear a newer arming.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel generation meaning "not armed".
const DISARMED: u64 = 0;

/// Proof of one arming, used to disarm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a failed write must disarm with its token"]
pub struct EchoToken(u64);

/// One-shot latch keyed by generation.
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    armed: AtomicU64,
    generation: AtomicU64,
}

impl EchoSuppressor {
    /// Creates a disarmed suppressor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: AtomicU64::new(DISARMED),
            generation: AtomicU64::new(DISARMED),
        }
    }

    /// Arms the latch for the next notice.
    pub fn arm(&self) -> EchoToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.armed.store(generation, Ordering::Release);
        EchoToken(generation)
    }

    /// Clears the latch if `token`'s arming has not been consumed.
    ///
    /// Returns `true` if this call disarmed it.
    pub fn disarm(&self, token: EchoToken) -> bool {
        self.armed
            .compare_exchange(token.0, DISARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consumes an armed latch. Returns `true` if the caller should
    /// swallow the notice it is handling.
    pub fn take(&self) -> bool {
        self.armed.swap(DISARMED, Ordering::AcqRel) != DISARMED
    }

    /// Returns `true` while an arming is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire) != DISARMED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_swallows_exactly_once() {
        let echo = EchoSuppressor::new();
        assert!(!echo.take());

        let _token = echo.arm();
        assert!(echo.is_armed());
        assert!(echo.take());
        assert!(!echo.take());
    }

    #[test]
    fn disarm_clears_pending_arming() {
        let echo = EchoSuppressor::new();
        let token = echo.arm();
        assert!(echo.disarm(token));
        assert!(!echo.is_armed());
        assert!(!echo.take());
    }

    #[test]
    fn stale_token_cannot_clear_newer_arming() {
        let echo = EchoSuppressor::new();
        let old = echo.arm();
        assert!(echo.take());

        let _current = echo.arm();
        assert!(!echo.disarm(old));
        assert!(echo.is_armed());
    }

    #[test]
    fn disarm_after_consumption_is_a_no_op() {
        let echo = EchoSuppressor::new();
        let token = echo.arm();
        assert!(echo.take());
        assert!(!echo.disarm(token));
    }
}
