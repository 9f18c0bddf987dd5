//! Vigil sensor core.
//!
//! The kernel-boundary half of an endpoint security agent:
//! - Blocking authorization of process execution, with a bounded wait
//!   for a user-space verdict
//! - Fire-and-forget notifications for completed file operations
//!   (close-after-write, delete, exec completion, rename)
//! - Socket-connection observation
//!
//! Hooks run on the intercepted operation's own thread and hand
//! structured events to a decision/recording service through bounded
//! dispatch channels. All failures degrade to the OS default decision:
//! the sensor prefers availability over strict enforcement.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gate;
pub mod lifecycle;
pub mod sensor;
pub mod socket;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CacheStore, ExecSnapshot, MemoryCacheStore};
pub use config::Config;
pub use context::{FileAttributes, FsVnode, OperationContext, Vnode, VnodeKind};
pub use dispatch::{ChannelDispatcher, EventDispatcher, EventStream};
pub use error::SensorError;
pub use event::{
    EventKind, EventPayload, FileIdentity, FileInfo, NetworkInfo, ProcessInfo, SensorEvent,
    Verdict, MAX_PATH_LEN,
};
pub use sensor::{
    FileOpAction, InterceptScope, LocalScopeRegistry, ScopeRegistry, Sensor, VnodeAction,
};
pub use socket::{Protocol, SocketContext, SocketMonitor};
