//! Event-metadata assembly.
//!
//! Populates an event record from a raw operation context in a fixed
//! order: basic info (capture time + file identity) first, since the
//! identity keys every cache interaction; process info next, cheap and
//! fails fast; file metadata last, the most expensive lookup. The first
//! failure short-circuits and propagates; the already-recorded fields
//! stay in place, and the caller decides whether the partial event is
//! still worth dispatching.

use crate::context::{OperationContext, Vnode};
use crate::error::SensorError;
use crate::event::{capture_time, FileInfo, ProcessInfo, SensorEvent};
use tracing::warn;

/// Record capture time unconditionally; compose the file identity when
/// both a process context and a vnode are present. A failed identity
/// lookup propagates, but the timestamp survives.
pub fn fill_basic_info(
    event: &mut SensorEvent,
    ctx: &OperationContext,
    node: Option<&dyn Vnode>,
) -> Result<(), SensorError> {
    event.time = capture_time();
    let (Some(_), Some(node)) = (ctx.process.as_ref(), node) else {
        return Ok(());
    };
    event.identity = node.identity()?;
    Ok(())
}

/// Copy pid, parent pid, and effective/real uid and gid from the
/// operation context. Zero values are legal; a missing context is not.
pub fn fill_process_info(
    info: &mut ProcessInfo,
    ctx: &OperationContext,
) -> Result<(), SensorError> {
    let process = ctx
        .process
        .as_ref()
        .ok_or(SensorError::InvalidArgument("operation context has no process"))?;
    *info = *process;
    Ok(())
}

/// Fill owner, mode, timestamps, and the resolved absolute path. A
/// missing vnode or process context makes this a no-op: file-less events
/// must not fail the pipeline.
pub fn fill_file_info(
    info: Option<&mut FileInfo>,
    ctx: &OperationContext,
    node: Option<&dyn Vnode>,
) -> Result<(), SensorError> {
    let (Some(info), Some(_), Some(node)) = (info, ctx.process.as_ref(), node) else {
        return Ok(());
    };
    let attrs = node.attributes()?;
    info.uid = attrs.uid;
    info.gid = attrs.gid;
    info.mode = attrs.mode;
    info.atime = attrs.atime;
    info.mtime = attrs.mtime;
    info.ctime = attrs.ctime;
    let path = node.resolved_path()?;
    info.set_path(&path.to_string_lossy());
    Ok(())
}

/// Assemble a full event record: basic, process, then file info, with the
/// payload slot selected by the event kind.
pub fn fill_event_info(
    event: &mut SensorEvent,
    ctx: &OperationContext,
    node: Option<&dyn Vnode>,
) -> Result<(), SensorError> {
    if let Err(err) = fill_basic_info(event, ctx, node) {
        warn!(kind = ?event.kind, error = %err, "failed to fill basic info");
        return Err(err);
    }
    if let Err(err) = fill_process_info(&mut event.process, ctx) {
        warn!(kind = ?event.kind, error = %err, "failed to fill process info");
        return Err(err);
    }
    if let Err(err) = fill_file_info(event.file_info_mut(), ctx, node) {
        warn!(kind = ?event.kind, error = %err, "failed to fill file info");
        return Err(err);
    }
    Ok(())
}
