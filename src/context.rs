//! Operation context and vnode abstraction: the platform seam.
//!
//! A hook invocation carries an [`OperationContext`] (the credentials of the
//! process performing the operation) and, where applicable, a [`Vnode`] for
//! the file being operated on. The trait keeps metadata lookups fallible the
//! way the underlying OS calls are; the filesystem-backed implementation is
//! what the agent binary wires in.

use crate::error::SensorError;
use crate::event::{FileIdentity, ProcessInfo};
use std::path::{Path, PathBuf};

/// Filesystem object type, used by the hooks' fast-path filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// File attributes retrieved in one lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileAttributes {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

/// A handle to the filesystem object an operation targets.
///
/// Every lookup can fail independently; callers decide how much of a
/// partially assembled event is still worth dispatching.
pub trait Vnode: Send + Sync {
    fn kind(&self) -> VnodeKind;

    /// Composite (volume id, file id) identity.
    fn identity(&self) -> Result<FileIdentity, SensorError>;

    fn attributes(&self) -> Result<FileAttributes, SensorError>;

    /// Resolved absolute path of the object.
    fn resolved_path(&self) -> Result<PathBuf, SensorError>;
}

/// Context of the process performing an intercepted operation.
///
/// `process` is absent when the platform could not supply credentials;
/// the assembler treats that as an invalid-argument condition for
/// process info and skips file info entirely.
#[derive(Debug, Default, Clone)]
pub struct OperationContext {
    pub process: Option<ProcessInfo>,
}

impl OperationContext {
    pub fn with_process(process: ProcessInfo) -> Self {
        Self {
            process: Some(process),
        }
    }

    /// Context without credentials; assembly degrades accordingly.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fresh context for the calling process, used by the notification
    /// path which does not inherit the original blocking context.
    pub fn current() -> Self {
        let process = unsafe {
            ProcessInfo {
                pid: libc::getpid() as u32,
                ppid: libc::getppid() as u32,
                euid: libc::geteuid(),
                egid: libc::getegid(),
                ruid: libc::getuid(),
                rgid: libc::getgid(),
            }
        };
        Self::with_process(process)
    }
}

/// [`Vnode`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsVnode {
    path: PathBuf,
}

impl FsVnode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> Result<std::fs::Metadata, SensorError> {
        std::fs::symlink_metadata(&self.path).map_err(SensorError::Metadata)
    }
}

impl Vnode for FsVnode {
    fn kind(&self) -> VnodeKind {
        match self.metadata() {
            Ok(meta) => {
                let ft = meta.file_type();
                if ft.is_file() {
                    VnodeKind::Regular
                } else if ft.is_dir() {
                    VnodeKind::Directory
                } else if ft.is_symlink() {
                    VnodeKind::Symlink
                } else {
                    VnodeKind::Other
                }
            }
            Err(_) => VnodeKind::Other,
        }
    }

    fn identity(&self) -> Result<FileIdentity, SensorError> {
        use std::os::unix::fs::MetadataExt;
        let meta = self.metadata()?;
        Ok(FileIdentity::new(meta.dev() as u32, meta.ino() as u32))
    }

    fn attributes(&self) -> Result<FileAttributes, SensorError> {
        use std::os::unix::fs::MetadataExt;
        let meta = self.metadata()?;
        Ok(FileAttributes {
            uid: meta.uid(),
            gid: meta.gid(),
            mode: meta.mode(),
            atime: meta.atime().max(0) as u64,
            mtime: meta.mtime().max(0) as u64,
            ctime: meta.ctime().max(0) as u64,
        })
    }

    fn resolved_path(&self) -> Result<PathBuf, SensorError> {
        std::fs::canonicalize(&self.path).map_err(SensorError::PathResolve)
    }
}
