//! Single-release slot for a provider's disposer.
//!
//! The disposer becomes available only when the provider invocation
//! resolves, which may happen before or after the channel disconnects.
//! Every ordering funnels through one lock so the disposer runs at most once,
//! and always runs if it was resolved while a release was owed.

use askbridge_providers::Disposer;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
enum SlotState {
    /// No provider call issued yet.
    Unarmed,
    /// Provider call in flight, nothing requested.
    Pending,
    /// Disposer available, release not yet owed.
    Ready(Disposer),
    /// Disconnect happened while the call was still in flight.
    CancelRequested,
    /// The stream ended (done or failed) while the call was still in flight.
    Finished,
    /// Terminal: the disposer has been run, or never will be.
    Released,
}

/// Tracks the disposer of one provider invocation.
#[derive(Debug)]
pub struct CleanupSlot {
    state: Mutex<SlotState>,
}

impl Default for CleanupSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Unarmed),
        }
    }

    /// Mark the provider call as issued.
    ///
    /// Returns `false` when the slot was already cancelled or armed, in which
    /// case no provider call may be made.
    pub fn arm(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            SlotState::Unarmed => {
                *state = SlotState::Pending;
                true
            }
            _ => false,
        }
    }

    /// The channel disconnected: release now, or as soon as the disposer
    /// arrives.
    pub fn cancel(&self) {
        let ready = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SlotState::Released) {
                SlotState::Unarmed => None,
                SlotState::Pending => {
                    *state = SlotState::CancelRequested;
                    None
                }
                SlotState::Ready(disposer) => Some(disposer),
                other => {
                    *state = other;
                    None
                }
            }
        };
        release(ready, "disconnect");
    }

    /// The stream reached a terminal event: release the disposer once.
    pub fn finish(&self) {
        let ready = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SlotState::Released) {
                SlotState::Pending => {
                    *state = SlotState::Finished;
                    None
                }
                SlotState::Ready(disposer) => Some(disposer),
                SlotState::Unarmed => None,
                other => {
                    *state = other;
                    None
                }
            }
        };
        release(ready, "finish");
    }

    /// The provider call resolved with its disposer.
    pub fn resolve(&self, disposer: Disposer) {
        let owed = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SlotState::Released) {
                SlotState::Pending => {
                    *state = SlotState::Ready(disposer);
                    None
                }
                SlotState::CancelRequested | SlotState::Finished | SlotState::Released => {
                    Some(disposer)
                }
                SlotState::Unarmed => {
                    *state = SlotState::Unarmed;
                    Some(disposer)
                }
                SlotState::Ready(previous) => {
                    *state = SlotState::Ready(previous);
                    Some(disposer)
                }
            }
        };
        release(owed, "resolve");
    }

    /// Whether the slot has reached its terminal state.
    pub fn is_released(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Released)
    }
}

fn release(disposer: Option<Disposer>, trigger: &str) {
    if let Some(disposer) = disposer {
        debug!("Releasing {} disposer on {}", disposer.label(), trigger);
        disposer.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted() -> (Disposer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let disposer = Disposer::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (disposer, calls)
    }

    #[test]
    fn test_resolve_then_finish() {
        let slot = CleanupSlot::new();
        let (disposer, calls) = counted();
        assert!(slot.arm());
        slot.resolve(disposer);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        slot.finish();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        slot.cancel();
        slot.finish();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_released());
    }

    #[test]
    fn test_finish_then_resolve() {
        let slot = CleanupSlot::new();
        let (disposer, calls) = counted();
        slot.arm();
        slot.finish();
        slot.cancel();
        slot.resolve(disposer);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_disposer_resolves() {
        let slot = CleanupSlot::new();
        let (disposer, calls) = counted();
        slot.arm();
        slot.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        slot.resolve(disposer);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_disposer_resolves() {
        let slot = CleanupSlot::new();
        let (disposer, calls) = counted();
        slot.arm();
        slot.resolve(disposer);
        slot.cancel();
        slot.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_arm_blocks_the_call() {
        let slot = CleanupSlot::new();
        slot.cancel();
        assert!(!slot.arm());
        assert!(slot.is_released());
    }

    #[test]
    fn test_arm_only_once() {
        let slot = CleanupSlot::new();
        assert!(slot.arm());
        assert!(!slot.arm());
    }

    #[test]
    fn test_concurrent_cancel_and_resolve_release_once() {
        for _ in 0..200 {
            let slot = Arc::new(CleanupSlot::new());
            let (disposer, calls) = counted();
            slot.arm();

            let canceller = {
                let slot = slot.clone();
                std::thread::spawn(move || slot.cancel())
            };
            let resolver = {
                let slot = slot.clone();
                std::thread::spawn(move || slot.resolve(disposer))
            };
            canceller.join().unwrap();
            resolver.join().unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
