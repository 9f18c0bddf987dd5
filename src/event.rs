//! Event records exchanged with the user-space decision service.
//!
//! Each intercepted operation produces exactly one [`SensorEvent`], a value
//! object created at hook entry and dropped right after dispatch. The
//! composite [`FileIdentity`] is the only key correlating events across the
//! pipeline (verdict cache, pending-exec mapping, wait/wake gate).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of any path field, shared by all payloads.
/// Longer paths are truncated silently.
pub const MAX_PATH_LEN: usize = 1024;

/// Composite file identity: volume id in the high 32 bits, file id in the
/// low 32 bits. Zero means the metadata lookup never succeeded; consumers
/// must tolerate the resulting cache miss.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FileIdentity(u64);

impl FileIdentity {
    pub fn new(volume_id: u32, file_id: u32) -> Self {
        Self((u64::from(volume_id) << 32) | u64::from(file_id))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verdict returned to the authorization hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum Verdict {
    Allow = 1,
    Deny = 2,
    Defer = 3,
}

impl Verdict {
    /// Decode a cached raw decision. Zero and unknown values mean "no
    /// decision" and map to Defer.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Verdict::Allow,
            2 => Verdict::Deny,
            _ => Verdict::Defer,
        }
    }
}

/// Kinds of events the sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Blocking authorization request for a process execution.
    AuthProcessCreate,
    /// A process execution completed.
    NotifyProcessCreate,
    /// A file was closed after being modified.
    NotifyFileCloseModify,
    /// A file was deleted.
    NotifyFileDelete,
    /// A file was renamed.
    NotifyFileRename,
    /// A socket connection was observed.
    NotifyNetworkAccess,
}

/// Identity of the process performing the intercepted operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub euid: u32,
    pub egid: u32,
    pub ruid: u32,
    pub rgid: u32,
}

/// File metadata captured for file-backed events.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub path: String,
}

impl FileInfo {
    /// Store a path, truncating at `MAX_PATH_LEN` on a char boundary.
    pub fn set_path(&mut self, path: &str) {
        self.path = bounded_path(path);
    }
}

/// Connection metadata for network events.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub protocol: String,
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
}

/// Type-specific payload; exactly one variant per event, selected by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    File(FileInfo),
    Rename { source: FileInfo, new_path: String },
    Network(NetworkInfo),
}

/// The unit exchanged with user space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    pub kind: EventKind,
    /// Capture time, seconds since the epoch.
    pub time: u64,
    pub identity: FileIdentity,
    pub process: ProcessInfo,
    pub payload: EventPayload,
}

impl SensorEvent {
    /// Create an empty event of the given kind with its payload slot
    /// already selected.
    pub fn new(kind: EventKind) -> Self {
        let payload = match kind {
            EventKind::NotifyFileRename => EventPayload::Rename {
                source: FileInfo::default(),
                new_path: String::new(),
            },
            EventKind::NotifyNetworkAccess => EventPayload::Network(NetworkInfo::default()),
            _ => EventPayload::File(FileInfo::default()),
        };
        Self {
            kind,
            time: 0,
            identity: FileIdentity::default(),
            process: ProcessInfo::default(),
            payload,
        }
    }

    /// The file-metadata slot for this event, if its kind carries one.
    /// Rename events expose their source-file slot.
    pub fn file_info_mut(&mut self) -> Option<&mut FileInfo> {
        match &mut self.payload {
            EventPayload::File(info) => Some(info),
            EventPayload::Rename { source, .. } => Some(source),
            EventPayload::Network(_) => None,
        }
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        match &self.payload {
            EventPayload::File(info) => Some(info),
            EventPayload::Rename { source, .. } => Some(source),
            EventPayload::Network(_) => None,
        }
    }
}

/// Record the current wall-clock time at seconds resolution.
pub(crate) fn capture_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn bounded_path(path: &str) -> String {
    if path.len() <= MAX_PATH_LEN {
        return path.to_string();
    }
    let mut end = MAX_PATH_LEN;
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    path[..end].to_string()
}
