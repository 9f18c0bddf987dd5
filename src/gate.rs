//! Per-identity wait/wake protocol for the authorization hook.
//!
//! The hook thread blocks on the file identity of the event it submitted
//! and is released either by a verdict posted for that identity or by the
//! configured timeout. A wake bumps the slot's generation and notifies
//! every thread parked on it: concurrent execute operations on the same
//! identity legitimately share one slot, so a single verdict releases all
//! of them and each reads the same cached decision. A wake with no waiter
//! registered is lost. Both behaviors are inherited from the original
//! protocol and kept as-is.

use crate::event::FileIdentity;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A verdict was posted for the identity before the timeout.
    Signaled,
    /// The timeout elapsed with no verdict.
    TimedOut,
}

#[derive(Default)]
struct WaitSlot {
    generation: Mutex<u64>,
    cond: Condvar,
}

struct SlotEntry {
    slot: Arc<WaitSlot>,
    waiters: usize,
}

/// Wait-slot table keyed by file identity.
#[derive(Default)]
pub struct AuthGate {
    slots: Mutex<HashMap<FileIdentity, SlotEntry>>,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the calling thread until [`wake`](Self::wake) is called for
    /// `identity` or `timeout` elapses, whichever comes first.
    pub fn wait(&self, identity: FileIdentity, timeout: Duration) -> WaitOutcome {
        // The generation snapshot is taken under the table lock so a wake
        // arriving between registration and parking still releases us.
        let (slot, seen) = {
            let mut slots = self.slots.lock();
            let entry = slots.entry(identity).or_insert_with(|| SlotEntry {
                slot: Arc::new(WaitSlot::default()),
                waiters: 0,
            });
            entry.waiters += 1;
            let seen = *entry.slot.generation.lock();
            (Arc::clone(&entry.slot), seen)
        };

        let outcome = {
            let mut generation = slot.generation.lock();
            let result =
                slot.cond
                    .wait_while_for(&mut generation, |gen| *gen == seen, timeout);
            if result.timed_out() && *generation == seen {
                WaitOutcome::TimedOut
            } else {
                WaitOutcome::Signaled
            }
        };

        let mut slots = self.slots.lock();
        if let Some(entry) = slots.get_mut(&identity) {
            entry.waiters -= 1;
            if entry.waiters == 0 {
                slots.remove(&identity);
            }
        }
        outcome
    }

    /// Release every thread currently waiting on `identity`.
    pub fn wake(&self, identity: FileIdentity) {
        let slots = self.slots.lock();
        if let Some(entry) = slots.get(&identity) {
            let mut generation = entry.slot.generation.lock();
            *generation = generation.wrapping_add(1);
            entry.slot.cond.notify_all();
        }
    }

    /// Number of identities with at least one parked waiter.
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}
