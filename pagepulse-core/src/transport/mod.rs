//! Best-effort event dispatch
//!
//! ## Architecture
//!
//! Dispatch never blocks the host and never reports failure to the caller:
//! - Payloads are serialized once and handed to a [`Beacon`]
//! - A beacon submits without waiting for a response
//! - Anything that goes wrong becomes a `TransportFailure` diagnostic
//!
//! Before the session is ready, caller events wait in the [`PendingQueue`];
//! once it has been drained, events are composed and sent immediately.

mod http;
mod queue;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub use http::HttpBeacon;
pub use queue::{PendingQueue, QueueTag, QueuedEvent};

use crate::diagnostics::{report, report_error, Diagnostic, DiagnosticSink, FailureKind};
use crate::error::{Error, Result};
use crate::event::Event;

/// How urgently a payload must leave the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Ordinary request
    Standard,
    /// Teardown-safe delivery that should survive the page going away
    Beacon,
}

/// Fire-and-forget payload submission.
pub trait Beacon {
    /// Queue `body` for delivery. An error means it was never handed off.
    fn submit(&self, body: Vec<u8>, mode: DeliveryMode) -> Result<()>;
}

/// Beacon that keeps every payload in memory.
///
/// Used by tests and by dry runs that only need to see what would be sent.
#[derive(Debug, Default)]
pub struct MemoryBeacon {
    sent: RefCell<Vec<(Vec<u8>, DeliveryMode)>>,
    failing: Cell<bool>,
}

impl MemoryBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later submissions fail, as an offline host would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Every accepted payload, decoded.
    pub fn events(&self) -> Vec<Event> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|(body, _)| serde_json::from_slice(body).ok())
            .collect()
    }

    /// Event names in submission order.
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    pub fn modes(&self) -> Vec<DeliveryMode> {
        self.sent.borrow().iter().map(|(_, mode)| *mode).collect()
    }

    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }
}

impl Beacon for MemoryBeacon {
    fn submit(&self, body: Vec<u8>, mode: DeliveryMode) -> Result<()> {
        if self.failing.get() {
            return Err(Error::Transport("beacon offline".to_string()));
        }
        self.sent.borrow_mut().push((body, mode));
        Ok(())
    }
}

/// What happened to an event handed to [`Transport::enqueue_or_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    Sent,
    Queued,
    Dropped,
}

pub struct Transport {
    beacon: Rc<dyn Beacon>,
    pending: PendingQueue,
    sink: Rc<dyn DiagnosticSink>,
}

impl Transport {
    pub fn new(beacon: Rc<dyn Beacon>, pending: PendingQueue, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            beacon,
            pending,
            sink,
        }
    }

    /// Serialize and submit one event. Returns whether the beacon accepted it.
    pub fn send(&self, event: &Event, mode: DeliveryMode) -> bool {
        let result = serde_json::to_vec(event)
            .map_err(Error::from)
            .and_then(|body| self.beacon.submit(body, mode));

        match result {
            Ok(()) => {
                tracing::trace!(event = %event.name, ?mode, "Dispatched event");
                true
            }
            Err(e) => {
                report(
                    self.sink.as_ref(),
                    Diagnostic::new(FailureKind::TransportFailure, "transport.send", e.to_string()),
                );
                false
            }
        }
    }

    /// Queue `entry` while the pending queue is open, otherwise compose and send it.
    pub fn enqueue_or_send(
        &mut self,
        entry: QueuedEvent,
        compose: impl FnOnce(QueuedEvent) -> Result<Event>,
    ) -> Outgoing {
        if !self.pending.is_drained() {
            return match self.pending.push(entry) {
                Ok(()) => Outgoing::Queued,
                Err(e) => {
                    report(
                        self.sink.as_ref(),
                        Diagnostic::new(
                            FailureKind::TransportFailure,
                            "transport.enqueue",
                            e.to_string(),
                        ),
                    );
                    Outgoing::Dropped
                }
            };
        }

        match compose(entry) {
            Ok(event) if self.send(&event, DeliveryMode::Standard) => Outgoing::Sent,
            Ok(_) => Outgoing::Dropped,
            Err(e) => {
                report_error(self.sink.as_ref(), "transport.compose", &e);
                Outgoing::Dropped
            }
        }
    }

    /// Entries buffered before the session was ready, exactly once.
    pub fn drain_pending(&mut self) -> Vec<QueuedEvent> {
        self.pending.drain()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_drained()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
