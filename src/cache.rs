//! Shared decision/result store consumed by both hooks.
//!
//! Two keyed maps: authorization verdicts per file identity, and the
//! short-lived pending-exec mapping that stitches an authorization to its
//! later exec-completion notification. Entries are soft-state hints with
//! last-writer-wins semantics per key; bounding the maps is the store's
//! concern, not the hooks'.

use crate::event::{FileIdentity, Verdict};
use parking_lot::Mutex;
use std::collections::HashMap;

/// (pid, parent pid) snapshot taken when an execution is authorized.
///
/// The notification path cannot reliably observe the parent pid (it may
/// already have changed by the time the notify callback fires), so the
/// authorization-time snapshot is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSnapshot {
    pub pid: u32,
    pub ppid: u32,
}

/// Keyed lookup shared by the hooks; implementations must support
/// concurrent access with per-key last-writer-wins.
pub trait CacheStore: Send + Sync {
    fn verdict(&self, identity: FileIdentity) -> Option<Verdict>;
    fn store_verdict(&self, identity: FileIdentity, verdict: Verdict);

    fn pending_exec(&self, identity: FileIdentity) -> Option<ExecSnapshot>;
    fn store_pending_exec(&self, identity: FileIdentity, snapshot: ExecSnapshot);
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    verdicts: Mutex<HashMap<FileIdentity, Verdict>>,
    pending_exec: Mutex<HashMap<FileIdentity, ExecSnapshot>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn verdict(&self, identity: FileIdentity) -> Option<Verdict> {
        self.verdicts.lock().get(&identity).copied()
    }

    fn store_verdict(&self, identity: FileIdentity, verdict: Verdict) {
        self.verdicts.lock().insert(identity, verdict);
    }

    fn pending_exec(&self, identity: FileIdentity) -> Option<ExecSnapshot> {
        self.pending_exec.lock().get(&identity).copied()
    }

    fn store_pending_exec(&self, identity: FileIdentity, snapshot: ExecSnapshot) {
        self.pending_exec.lock().insert(identity, snapshot);
    }
}
