//! Test doubles shared across module tests.

use crate::context::{FileAttributes, Vnode, VnodeKind};
use crate::dispatch::EventDispatcher;
use crate::error::SensorError;
use crate::event::{FileIdentity, SensorEvent};
use crate::sensor::{InterceptScope, LocalScopeRegistry, ScopeRegistry};
use parking_lot::Mutex;
use std::path::PathBuf;

fn lookup_failure() -> SensorError {
    SensorError::Metadata(std::io::Error::from(std::io::ErrorKind::NotFound))
}

/// Vnode with scripted lookups; `None` fields fail.
pub(crate) struct StubVnode {
    pub kind: VnodeKind,
    pub identity: Option<FileIdentity>,
    pub attributes: Option<FileAttributes>,
    pub path: Option<PathBuf>,
}

impl StubVnode {
    pub fn regular(volume_id: u32, file_id: u32, path: &str) -> Self {
        Self {
            kind: VnodeKind::Regular,
            identity: Some(FileIdentity::new(volume_id, file_id)),
            attributes: Some(FileAttributes {
                uid: 1000,
                gid: 1000,
                mode: 0o100_755,
                atime: 1_660_000_000,
                mtime: 1_660_000_100,
                ctime: 1_660_000_200,
            }),
            path: Some(PathBuf::from(path)),
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            kind: VnodeKind::Directory,
            ..Self::regular(0, 0, path)
        }
    }

    /// Regular file whose every metadata lookup fails.
    pub fn failing() -> Self {
        Self {
            kind: VnodeKind::Regular,
            identity: None,
            attributes: None,
            path: None,
        }
    }
}

impl Vnode for StubVnode {
    fn kind(&self) -> VnodeKind {
        self.kind
    }

    fn identity(&self) -> Result<FileIdentity, SensorError> {
        self.identity.ok_or_else(lookup_failure)
    }

    fn attributes(&self) -> Result<FileAttributes, SensorError> {
        self.attributes.ok_or_else(lookup_failure)
    }

    fn resolved_path(&self) -> Result<PathBuf, SensorError> {
        self.path
            .clone()
            .ok_or_else(|| SensorError::PathResolve(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }
}

/// Dispatcher recording every submission.
#[derive(Default)]
pub(crate) struct CountingDispatcher {
    pub auth: Mutex<Vec<SensorEvent>>,
    pub notify: Mutex<Vec<SensorEvent>>,
}

impl CountingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_count(&self) -> usize {
        self.auth.lock().len()
    }

    pub fn notify_count(&self) -> usize {
        self.notify.lock().len()
    }

    pub fn last_notify(&self) -> Option<SensorEvent> {
        self.notify.lock().last().cloned()
    }
}

impl EventDispatcher for CountingDispatcher {
    fn submit_auth(&self, event: SensorEvent) -> bool {
        self.auth.lock().push(event);
        true
    }

    fn submit_notify(&self, event: SensorEvent) -> bool {
        self.notify.lock().push(event);
        true
    }
}

/// Registry that rejects one scope, for pair-rollback tests.
pub(crate) struct RejectingRegistry {
    pub inner: LocalScopeRegistry,
    pub reject: InterceptScope,
}

impl RejectingRegistry {
    pub fn rejecting(reject: InterceptScope) -> Self {
        Self {
            inner: LocalScopeRegistry::new(),
            reject,
        }
    }
}

impl ScopeRegistry for RejectingRegistry {
    fn listen(&self, scope: InterceptScope) -> Result<(), SensorError> {
        if scope == self.reject {
            return Err(SensorError::Registration("scope unavailable"));
        }
        self.inner.listen(scope)
    }

    fn unlisten(&self, scope: InterceptScope) {
        self.inner.unlisten(scope);
    }
}
