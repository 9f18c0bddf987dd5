//! Socket-connection monitor.
//!
//! The notification pattern applied to the network boundary: observe a
//! connection, assemble an event, forward it without blocking. The
//! monitor cannot affect the connection.

use crate::assembler::{fill_basic_info, fill_process_info};
use crate::context::OperationContext;
use crate::dispatch::EventDispatcher;
use crate::error::SensorError;
use crate::event::{EventKind, EventPayload, SensorEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Transport protocol of an observed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// A connection observed at the socket layer.
#[derive(Debug, Clone)]
pub struct SocketContext {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

/// Fire-and-forget reporter for socket activity.
pub struct SocketMonitor {
    dispatcher: Arc<dyn EventDispatcher>,
}

impl SocketMonitor {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Report an observed connection. Best-effort: failures drop the
    /// event and nothing else.
    pub fn connection_callback(&self, conn: &SocketContext) {
        let mut event = SensorEvent::new(EventKind::NotifyNetworkAccess);
        let ctx = OperationContext::current();
        if let Err(err) = self.fill_net_event_info(&mut event, &ctx, conn) {
            warn!(error = %err, "failed to fill network event");
            return;
        }
        self.dispatcher.submit_notify(event);
    }

    fn fill_net_event_info(
        &self,
        event: &mut SensorEvent,
        ctx: &OperationContext,
        conn: &SocketContext,
    ) -> Result<(), SensorError> {
        fill_basic_info(event, ctx, None)?;
        fill_process_info(&mut event.process, ctx)?;
        self.fill_connection_info(event, conn)
    }

    fn fill_connection_info(
        &self,
        event: &mut SensorEvent,
        conn: &SocketContext,
    ) -> Result<(), SensorError> {
        let EventPayload::Network(info) = &mut event.payload else {
            return Err(SensorError::InvalidArgument("event has no network payload"));
        };
        info.protocol = conn.protocol.as_str().to_string();
        info.local_addr = conn.local.ip().to_string();
        info.local_port = conn.local.port();
        info.remote_addr = conn.remote.ip().to_string();
        info.remote_port = conn.remote.port();
        Ok(())
    }
}
