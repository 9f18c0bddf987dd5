//! Interception hooks and scope registration.
//!
//! The sensor owns the two kernel-facing callbacks: the vnode scope
//! (blocking authorization of process execution) and the fileop scope
//! (fire-and-forget notifications for completed operations). Both run on
//! the intercepted operation's own thread; the only blocking point is the
//! authorization wait. Collaborators are injected at construction; the
//! sensor never reaches for process-wide singletons.

use crate::assembler::fill_event_info;
use crate::cache::{CacheStore, ExecSnapshot};
use crate::config::SensorConfig;
use crate::context::{OperationContext, Vnode, VnodeKind};
use crate::dispatch::EventDispatcher;
use crate::error::SensorError;
use crate::event::{bounded_path, EventKind, EventPayload, FileIdentity, SensorEvent, Verdict};
use crate::gate::{AuthGate, WaitOutcome};
use crate::lifecycle::InflightCounter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Actions arriving on the vnode scope. Only Execute is authorized;
/// everything else is deferred to the OS default with no event built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeAction {
    Execute,
    Read,
    Write,
    Other,
}

/// Completed operations arriving on the fileop scope.
///
/// Paths come from the interception layer verbatim. Delete and rename
/// mirror the kernel callback's argument shape: a delete still carries
/// its vnode for the regular-file check, a rename carries none.
pub enum FileOpAction<'a> {
    Close {
        node: &'a dyn Vnode,
        path: &'a str,
        modified: bool,
    },
    Delete {
        node: &'a dyn Vnode,
        path: &'a str,
    },
    Exec {
        node: &'a dyn Vnode,
        path: &'a str,
    },
    Rename {
        src_path: &'a str,
        new_path: &'a str,
    },
}

/// The two interception points, always registered and removed as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptScope {
    Vnode,
    FileOp,
}

/// Platform seam for attaching the callbacks to the OS.
pub trait ScopeRegistry: Send + Sync {
    fn listen(&self, scope: InterceptScope) -> Result<(), SensorError>;
    fn unlisten(&self, scope: InterceptScope);
}

/// In-process registry tracking scope occupancy; double registration of a
/// scope fails. Used by the agent binary and as the default in tests.
#[derive(Default)]
pub struct LocalScopeRegistry {
    vnode: AtomicBool,
    fileop: AtomicBool,
}

impl LocalScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, scope: InterceptScope) -> &AtomicBool {
        match scope {
            InterceptScope::Vnode => &self.vnode,
            InterceptScope::FileOp => &self.fileop,
        }
    }

    pub fn is_listening(&self, scope: InterceptScope) -> bool {
        self.slot(scope).load(Ordering::Acquire)
    }
}

impl ScopeRegistry for LocalScopeRegistry {
    fn listen(&self, scope: InterceptScope) -> Result<(), SensorError> {
        if self.slot(scope).swap(true, Ordering::AcqRel) {
            return Err(SensorError::Registration("scope already registered"));
        }
        Ok(())
    }

    fn unlisten(&self, scope: InterceptScope) {
        self.slot(scope).store(false, Ordering::Release);
    }
}

/// The sensor core: hooks, wait/wake gate, and lifecycle accounting.
pub struct Sensor {
    cache: Arc<dyn CacheStore>,
    dispatcher: Arc<dyn EventDispatcher>,
    registry: Arc<dyn ScopeRegistry>,
    gate: AuthGate,
    inflight: InflightCounter,
    auth_timeout: Duration,
    registered: AtomicBool,
}

impl Sensor {
    pub fn new(
        config: &SensorConfig,
        cache: Arc<dyn CacheStore>,
        dispatcher: Arc<dyn EventDispatcher>,
        registry: Arc<dyn ScopeRegistry>,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            registry,
            gate: AuthGate::new(),
            inflight: InflightCounter::new(),
            auth_timeout: Duration::from_millis(config.auth_timeout_ms),
            registered: AtomicBool::new(false),
        }
    }

    /// Register both interception scopes as an atomic pair: if the second
    /// registration fails, the first is rolled back.
    pub fn start_interception(&self) -> Result<(), SensorError> {
        self.registry.listen(InterceptScope::Vnode)?;
        if let Err(err) = self.registry.listen(InterceptScope::FileOp) {
            self.registry.unlisten(InterceptScope::Vnode);
            return Err(err);
        }
        self.registered.store(true, Ordering::Release);
        info!("interception scopes registered");
        Ok(())
    }

    /// Deregister both scopes and block until every callback already in
    /// flight has drained.
    pub fn stop_interception(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            self.registry.unlisten(InterceptScope::Vnode);
            self.registry.unlisten(InterceptScope::FileOp);
        }
        self.inflight.wait_idle();
        debug!("interception stopped, no callbacks in flight");
    }

    /// Callbacks currently executing.
    pub fn in_flight(&self) -> usize {
        self.inflight.active()
    }

    /// Record a verdict from the decision service and release any hook
    /// blocked on the identity.
    pub fn post_verdict(&self, identity: FileIdentity, verdict: Verdict) {
        self.cache.store_verdict(identity, verdict);
        self.gate.wake(identity);
    }

    /// Vnode-scope callback: blocking authorization of an execution.
    ///
    /// Returns within the configured timeout. Internal failures never
    /// deny; they defer to the OS default.
    pub fn vnode_callback(
        &self,
        ctx: &OperationContext,
        node: &dyn Vnode,
        action: VnodeAction,
    ) -> Verdict {
        if action != VnodeAction::Execute || node.kind() != VnodeKind::Regular {
            return Verdict::Defer;
        }
        let _guard = self.inflight.enter();
        self.authorize_exec(ctx, node)
    }

    fn authorize_exec(&self, ctx: &OperationContext, node: &dyn Vnode) -> Verdict {
        let mut event = SensorEvent::new(EventKind::AuthProcessCreate);
        if fill_event_info(&mut event, ctx, Some(node)).is_err() {
            return Verdict::Defer;
        }
        let identity = event.identity;
        let process = event.process;

        self.dispatcher.submit_auth(event);
        let verdict = self.decision_from_client(identity);
        if verdict == Verdict::Defer || verdict == Verdict::Allow {
            // Snapshot for the exec-completion notification: its parent
            // pid can already be stale by the time the notify path fires.
            self.cache.store_pending_exec(
                identity,
                ExecSnapshot {
                    pid: process.pid,
                    ppid: process.ppid,
                },
            );
        }
        verdict
    }

    fn decision_from_client(&self, identity: FileIdentity) -> Verdict {
        match self.gate.wait(identity, self.auth_timeout) {
            WaitOutcome::Signaled => self.cache.verdict(identity).unwrap_or(Verdict::Defer),
            WaitOutcome::TimedOut => {
                warn!(%identity, timeout_ms = self.auth_timeout.as_millis() as u64,
                    "authorization reply timed out");
                Verdict::Defer
            }
        }
    }

    /// Fileop-scope callback: fire-and-forget notification of a completed
    /// operation. Cannot affect whether the operation proceeds.
    pub fn fileop_callback(&self, action: FileOpAction<'_>) {
        let (kind, node, src_path, new_path): (EventKind, Option<&dyn Vnode>, &str, Option<&str>) =
            match action {
                FileOpAction::Close {
                    node,
                    path,
                    modified,
                } => {
                    if !modified || node.kind() != VnodeKind::Regular {
                        return;
                    }
                    (EventKind::NotifyFileCloseModify, Some(node), path, None)
                }
                FileOpAction::Delete { node, path } => {
                    if node.kind() != VnodeKind::Regular {
                        return;
                    }
                    // The object is unlinked by now; keep the path, drop
                    // the vnode.
                    (EventKind::NotifyFileDelete, None, path, None)
                }
                FileOpAction::Exec { node, path } => {
                    if node.kind() != VnodeKind::Regular {
                        return;
                    }
                    (EventKind::NotifyProcessCreate, Some(node), path, None)
                }
                FileOpAction::Rename { src_path, new_path } => {
                    (EventKind::NotifyFileRename, None, src_path, Some(new_path))
                }
            };

        let _guard = self.inflight.enter();
        self.notify_fileop(kind, node, src_path, new_path);
    }

    fn notify_fileop(
        &self,
        kind: EventKind,
        node: Option<&dyn Vnode>,
        src_path: &str,
        new_path: Option<&str>,
    ) {
        let mut event = SensorEvent::new(kind);
        if let Some(info) = event.file_info_mut() {
            info.set_path(src_path);
        }
        if let (EventPayload::Rename { new_path: slot, .. }, Some(dst)) =
            (&mut event.payload, new_path)
        {
            *slot = bounded_path(dst);
        }

        // The notify path never inherits the blocking context; it runs on
        // its own freshly captured one.
        let ctx = OperationContext::current();
        let assembled = fill_event_info(&mut event, &ctx, node);

        if kind == EventKind::NotifyProcessCreate {
            if let Some(snapshot) = self.cache.pending_exec(event.identity) {
                if snapshot.pid == event.process.pid {
                    event.process.ppid = snapshot.ppid;
                }
            }
        }

        if assembled.is_ok() {
            self.dispatcher.submit_notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::testutil::{CountingDispatcher, RejectingRegistry, StubVnode};
    use std::thread;
    use std::time::Instant;

    struct Fixture {
        sensor: Arc<Sensor>,
        cache: Arc<MemoryCacheStore>,
        dispatcher: Arc<CountingDispatcher>,
        registry: Arc<LocalScopeRegistry>,
    }

    fn fixture(auth_timeout_ms: u64) -> Fixture {
        let cache = Arc::new(MemoryCacheStore::new());
        let dispatcher = Arc::new(CountingDispatcher::new());
        let registry = Arc::new(LocalScopeRegistry::new());
        let config = SensorConfig { auth_timeout_ms };
        let sensor = Arc::new(Sensor::new(
            &config,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>,
            Arc::clone(&registry) as Arc<dyn ScopeRegistry>,
        ));
        Fixture {
            sensor,
            cache,
            dispatcher,
            registry,
        }
    }

    /// Keep posting a verdict until the hook under test has returned, so
    /// the wake cannot be lost to scheduling.
    fn post_until_done(
        sensor: &Arc<Sensor>,
        identity: FileIdentity,
        verdict: Verdict,
        done: &Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let sensor = Arc::clone(sensor);
        let done = Arc::clone(done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                sensor.post_verdict(identity, verdict);
                thread::sleep(Duration::from_millis(5));
            }
        })
    }

    #[test]
    fn filtered_actions_build_no_events() {
        let f = fixture(100);
        let ctx = OperationContext::current();
        let regular = StubVnode::regular(1, 1, "/bin/ls");
        let dir = StubVnode::directory("/tmp");

        for action in [VnodeAction::Read, VnodeAction::Write, VnodeAction::Other] {
            assert_eq!(f.sensor.vnode_callback(&ctx, &regular, action), Verdict::Defer);
        }
        assert_eq!(
            f.sensor.vnode_callback(&ctx, &dir, VnodeAction::Execute),
            Verdict::Defer
        );

        assert_eq!(f.dispatcher.auth_count(), 0);
        assert_eq!(f.dispatcher.notify_count(), 0);
        assert_eq!(f.sensor.in_flight(), 0);
    }

    #[test]
    fn posted_allow_reaches_the_waiting_hook() {
        let f = fixture(2000);
        let node = StubVnode::regular(5, 10, "/usr/local/bin/tool");
        let identity = FileIdentity::new(5, 10);
        let done = Arc::new(AtomicBool::new(false));
        let poster = post_until_done(&f.sensor, identity, Verdict::Allow, &done);

        let verdict =
            f.sensor
                .vnode_callback(&OperationContext::current(), &node, VnodeAction::Execute);
        done.store(true, Ordering::Release);
        poster.join().unwrap();

        assert_eq!(verdict, Verdict::Allow);
        assert_eq!(f.dispatcher.auth_count(), 1);
        // Allow records the pending-exec snapshot for the notify path.
        let snapshot = f.cache.pending_exec(identity).unwrap();
        assert_eq!(snapshot.pid, std::process::id());
    }

    #[test]
    fn missing_verdict_defers_after_the_timeout() {
        let f = fixture(80);
        let node = StubVnode::regular(6, 11, "/usr/bin/idle");
        let start = Instant::now();

        let verdict =
            f.sensor
                .vnode_callback(&OperationContext::current(), &node, VnodeAction::Execute);

        assert_eq!(verdict, Verdict::Defer);
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(f.dispatcher.auth_count(), 1);
        // Defer records the snapshot too.
        assert!(f.cache.pending_exec(FileIdentity::new(6, 11)).is_some());
    }

    #[test]
    fn deny_skips_the_pending_exec_snapshot() {
        let f = fixture(2000);
        let node = StubVnode::regular(7, 12, "/usr/bin/blocked");
        let identity = FileIdentity::new(7, 12);
        let done = Arc::new(AtomicBool::new(false));
        let poster = post_until_done(&f.sensor, identity, Verdict::Deny, &done);

        let verdict =
            f.sensor
                .vnode_callback(&OperationContext::current(), &node, VnodeAction::Execute);
        done.store(true, Ordering::Release);
        poster.join().unwrap();

        assert_eq!(verdict, Verdict::Deny);
        assert!(f.cache.pending_exec(identity).is_none());
    }

    #[test]
    fn assembly_failure_defers_without_waiting() {
        let f = fixture(5000);
        let node = StubVnode::failing();
        let start = Instant::now();

        let verdict =
            f.sensor
                .vnode_callback(&OperationContext::current(), &node, VnodeAction::Execute);

        assert_eq!(verdict, Verdict::Defer);
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(f.dispatcher.auth_count(), 0);
    }

    #[test]
    fn unmodified_close_is_ignored() {
        let f = fixture(100);
        let node = StubVnode::regular(2, 8, "/tmp/untouched.txt");
        f.sensor.fileop_callback(FileOpAction::Close {
            node: &node,
            path: "/tmp/untouched.txt",
            modified: false,
        });
        assert_eq!(f.dispatcher.notify_count(), 0);
    }

    #[test]
    fn modified_close_emits_one_event_with_the_source_path() {
        let f = fixture(100);
        let node = StubVnode::regular(2, 8, "/tmp/watched.txt");
        f.sensor.fileop_callback(FileOpAction::Close {
            node: &node,
            path: "/tmp/watched.txt",
            modified: true,
        });

        assert_eq!(f.dispatcher.notify_count(), 1);
        let event = f.dispatcher.last_notify().unwrap();
        assert_eq!(event.kind, EventKind::NotifyFileCloseModify);
        assert_eq!(event.identity, FileIdentity::new(2, 8));
        assert_eq!(event.file_info().unwrap().path, "/tmp/watched.txt");
    }

    #[test]
    fn delete_keeps_the_path_but_drops_the_vnode() {
        let f = fixture(100);
        let node = StubVnode::regular(2, 9, "/tmp/doomed.txt");
        f.sensor.fileop_callback(FileOpAction::Delete {
            node: &node,
            path: "/tmp/doomed.txt",
        });

        assert_eq!(f.dispatcher.notify_count(), 1);
        let event = f.dispatcher.last_notify().unwrap();
        assert_eq!(event.kind, EventKind::NotifyFileDelete);
        assert!(event.identity.is_unknown());
        let info = event.file_info().unwrap();
        assert_eq!(info.path, "/tmp/doomed.txt");
        assert_eq!(info.uid, 0);
    }

    #[test]
    fn rename_carries_both_paths_verbatim() {
        let f = fixture(100);
        f.sensor.fileop_callback(FileOpAction::Rename {
            src_path: "/srv/data/old-name",
            new_path: "/srv/data/new-name",
        });

        assert_eq!(f.dispatcher.notify_count(), 1);
        let event = f.dispatcher.last_notify().unwrap();
        assert_eq!(event.kind, EventKind::NotifyFileRename);
        match &event.payload {
            EventPayload::Rename { source, new_path } => {
                assert_eq!(source.path, "/srv/data/old-name");
                assert_eq!(new_path, "/srv/data/new-name");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn exec_completion_corrects_parent_pid_on_pid_match() {
        let f = fixture(100);
        let identity = FileIdentity::new(4, 4);
        f.cache.store_pending_exec(
            identity,
            ExecSnapshot {
                pid: std::process::id(),
                ppid: 777,
            },
        );

        let node = StubVnode::regular(4, 4, "/usr/bin/spawned");
        f.sensor.fileop_callback(FileOpAction::Exec {
            node: &node,
            path: "/usr/bin/spawned",
        });

        let event = f.dispatcher.last_notify().unwrap();
        assert_eq!(event.kind, EventKind::NotifyProcessCreate);
        assert_eq!(event.process.ppid, 777);
    }

    #[test]
    fn exec_completion_leaves_parent_pid_on_pid_mismatch() {
        let f = fixture(100);
        let identity = FileIdentity::new(4, 5);
        f.cache.store_pending_exec(
            identity,
            ExecSnapshot {
                pid: std::process::id().wrapping_add(1),
                ppid: 777,
            },
        );

        let node = StubVnode::regular(4, 5, "/usr/bin/spawned");
        f.sensor.fileop_callback(FileOpAction::Exec {
            node: &node,
            path: "/usr/bin/spawned",
        });

        let observed_ppid = OperationContext::current().process.unwrap().ppid;
        let event = f.dispatcher.last_notify().unwrap();
        assert_eq!(event.process.ppid, observed_ppid);
        assert_ne!(event.process.ppid, 777);
    }

    #[test]
    fn notify_assembly_failure_drops_the_event() {
        let f = fixture(100);
        let node = StubVnode::failing();
        f.sensor.fileop_callback(FileOpAction::Close {
            node: &node,
            path: "/tmp/gone.txt",
            modified: true,
        });
        assert_eq!(f.dispatcher.notify_count(), 0);
    }

    #[test]
    fn scopes_register_and_deregister_as_a_pair() {
        let f = fixture(100);
        f.sensor.start_interception().unwrap();
        assert!(f.registry.is_listening(InterceptScope::Vnode));
        assert!(f.registry.is_listening(InterceptScope::FileOp));

        f.sensor.stop_interception();
        assert!(!f.registry.is_listening(InterceptScope::Vnode));
        assert!(!f.registry.is_listening(InterceptScope::FileOp));
    }

    #[test]
    fn failed_second_registration_rolls_back_the_first() {
        let cache = Arc::new(MemoryCacheStore::new());
        let dispatcher = Arc::new(CountingDispatcher::new());
        let registry = Arc::new(RejectingRegistry::rejecting(InterceptScope::FileOp));
        let config = SensorConfig {
            auth_timeout_ms: 100,
        };
        let sensor = Sensor::new(
            &config,
            cache as Arc<dyn CacheStore>,
            dispatcher as Arc<dyn EventDispatcher>,
            Arc::clone(&registry) as Arc<dyn ScopeRegistry>,
        );

        assert!(sensor.start_interception().is_err());
        assert!(!registry.inner.is_listening(InterceptScope::Vnode));
        assert!(!registry.inner.is_listening(InterceptScope::FileOp));
    }

    #[test]
    fn teardown_waits_for_hooks_in_flight() {
        let f = fixture(150);
        f.sensor.start_interception().unwrap();

        let sensor = Arc::clone(&f.sensor);
        let hook = thread::spawn(move || {
            let node = StubVnode::regular(9, 9, "/bin/busy");
            sensor.vnode_callback(&OperationContext::current(), &node, VnodeAction::Execute)
        });
        while f.sensor.in_flight() == 0 {
            thread::yield_now();
        }

        f.sensor.stop_interception();
        assert_eq!(f.sensor.in_flight(), 0);
        assert_eq!(hook.join().unwrap(), Verdict::Defer);
    }
}
