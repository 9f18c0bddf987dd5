//! Event dispatch toward the user-space decision service.
//!
//! Two logical channels: authorization events that a hook blocks on, and
//! fire-and-forget notifications. Submission is non-blocking from the
//! hook's perspective; a full channel drops the event. In-flight events
//! are counted atomically from successful submit until the consumer
//! receives them.

use crate::event::SensorEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Multi-producer submission interface consumed by the hooks.
pub trait EventDispatcher: Send + Sync {
    /// Enqueue on the authorization channel. Returns false if the event
    /// was dropped.
    fn submit_auth(&self, event: SensorEvent) -> bool;

    /// Enqueue on the notify channel. Returns false if the event was
    /// dropped.
    fn submit_notify(&self, event: SensorEvent) -> bool;
}

/// Dispatcher backed by bounded tokio channels.
pub struct ChannelDispatcher {
    auth_tx: mpsc::Sender<SensorEvent>,
    notify_tx: mpsc::Sender<SensorEvent>,
    in_flight: Arc<AtomicUsize>,
}

/// Consumer half of one dispatch channel.
pub struct EventStream {
    rx: mpsc::Receiver<SensorEvent>,
    in_flight: Arc<AtomicUsize>,
}

impl ChannelDispatcher {
    /// Create the dispatcher plus the (authorization, notify) consumer
    /// streams.
    pub fn new(auth_capacity: usize, notify_capacity: usize) -> (Self, EventStream, EventStream) {
        let (auth_tx, auth_rx) = mpsc::channel(auth_capacity);
        let (notify_tx, notify_rx) = mpsc::channel(notify_capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let dispatcher = Self {
            auth_tx,
            notify_tx,
            in_flight: Arc::clone(&in_flight),
        };
        let auth_stream = EventStream {
            rx: auth_rx,
            in_flight: Arc::clone(&in_flight),
        };
        let notify_stream = EventStream {
            rx: notify_rx,
            in_flight,
        };
        (dispatcher, auth_stream, notify_stream)
    }

    /// Events submitted but not yet received by a consumer.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn submit(&self, tx: &mpsc::Sender<SensorEvent>, channel: &'static str, event: SensorEvent) -> bool {
        match tx.try_send(event) {
            Ok(()) => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(channel, kind = ?event.kind, "dispatch channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(channel, kind = ?event.kind, "dispatch channel closed, dropping event");
                false
            }
        }
    }
}

impl EventDispatcher for ChannelDispatcher {
    fn submit_auth(&self, event: SensorEvent) -> bool {
        self.submit(&self.auth_tx, "auth", event)
    }

    fn submit_notify(&self, event: SensorEvent) -> bool {
        self.submit(&self.notify_tx, "notify", event)
    }
}

impl EventStream {
    /// Receive the next event; `None` once all producers are gone.
    pub async fn recv(&mut self) -> Option<SensorEvent> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }
}
