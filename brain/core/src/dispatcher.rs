//! Inbound Dispatcher
//!
//! Everything a face sends arrives here as raw text. Well-formed `input`
//! events become [`TurnRequest`]s on a bounded queue; anything else is logged
//! and dropped without touching the connection.
//!
//! # Turn Queue
//!
//! ```text
//!  conn-1 ──┐
//!  conn-2 ──┼── dispatch() ──► [ bounded FIFO ] ──► TurnWorker ──► TurnDriver::run
//!  conn-3 ──┘     try_send        queue_capacity       one turn at a time
//! ```
//!
//! Inputs that arrive while a turn is streaming wait their turn. A full queue
//! rejects the input rather than blocking the connection's read loop.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::codec;
use crate::events::InboundEvent;
use crate::messages::OutboundEvent;
use crate::registry::ConnectionId;
use crate::turn::TurnDriver;

/// A queued utterance waiting for the turn worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /// What the user said
    pub text: String,
    /// Connection it came from
    pub origin: ConnectionId,
    /// When it was accepted
    pub received_at: Instant,
}

/// Why a well-formed input was turned away
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Empty or whitespace only
    #[error("input is blank")]
    Blank,
    /// Longer than the configured maximum
    #[error("input too long: {chars} chars (max: {max})")]
    TooLong {
        /// Input length in characters
        chars: usize,
        /// Allowed maximum
        max: usize,
    },
    /// Too many turns already waiting
    #[error("turn queue is full")]
    QueueFull,
    /// The turn worker has stopped
    #[error("turn worker is not running")]
    WorkerGone,
}

/// Result of dispatching one inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A turn was queued
    Queued,
    /// The payload was not a usable event
    Ignored(String),
    /// The input was valid but refused
    Rejected(RejectReason),
}

/// Create the turn queue shared by the dispatcher and the worker
#[must_use]
pub fn turn_queue(capacity: usize) -> (mpsc::Sender<TurnRequest>, mpsc::Receiver<TurnRequest>) {
    mpsc::channel(capacity)
}

/// Parses inbound payloads and feeds the turn queue
#[derive(Debug, Clone)]
pub struct InboundDispatcher {
    queue: mpsc::Sender<TurnRequest>,
    max_input_chars: usize,
    contract_version: String,
}

impl InboundDispatcher {
    /// Create a dispatcher feeding `queue`
    pub fn new(
        queue: mpsc::Sender<TurnRequest>,
        max_input_chars: usize,
        contract_version: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            max_input_chars,
            contract_version: contract_version.into(),
        }
    }

    /// The `contract_info` event a new face receives first
    #[must_use]
    pub fn contract_info(&self) -> OutboundEvent {
        OutboundEvent::contract_info(self.contract_version.clone())
    }

    /// Send `contract_info` to a single new connection
    ///
    /// Returns false if the connection is already gone.
    pub async fn welcome(&self, tx: &mpsc::Sender<OutboundEvent>) -> bool {
        tx.send(self.contract_info()).await.is_ok()
    }

    /// Handle one raw payload from `origin`
    pub fn dispatch(&self, origin: ConnectionId, raw: &str) -> DispatchOutcome {
        let event = match InboundEvent::from_json(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    connection_id = %origin,
                    error = %e,
                    payload = %codec::preview(raw),
                    "Ignoring inbound payload"
                );
                return DispatchOutcome::Ignored(e.to_string());
            }
        };

        match event {
            InboundEvent::Input { text } => self.enqueue(origin, text),
        }
    }

    fn enqueue(&self, origin: ConnectionId, text: String) -> DispatchOutcome {
        if let Err(reason) = self.check(&text) {
            return self.reject(origin, reason);
        }

        let request = TurnRequest {
            text,
            origin,
            received_at: Instant::now(),
        };

        match self.queue.try_send(request) {
            Ok(()) => {
                tracing::info!(connection_id = %origin, "Input queued");
                DispatchOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => self.reject(origin, RejectReason::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.reject(origin, RejectReason::WorkerGone)
            }
        }
    }

    fn check(&self, text: &str) -> Result<(), RejectReason> {
        if text.trim().is_empty() {
            return Err(RejectReason::Blank);
        }
        let chars = text.chars().count();
        if chars > self.max_input_chars {
            return Err(RejectReason::TooLong {
                chars,
                max: self.max_input_chars,
            });
        }
        Ok(())
    }

    fn reject(&self, origin: ConnectionId, reason: RejectReason) -> DispatchOutcome {
        tracing::warn!(connection_id = %origin, %reason, "Input rejected");
        DispatchOutcome::Rejected(reason)
    }
}

/// Drains the turn queue, one turn at a time
pub struct TurnWorker {
    driver: TurnDriver,
    rx: mpsc::Receiver<TurnRequest>,
}

impl TurnWorker {
    /// Create a worker for `driver` reading from `rx`
    #[must_use]
    pub fn new(driver: TurnDriver, rx: mpsc::Receiver<TurnRequest>) -> Self {
        Self { driver, rx }
    }

    /// Run until every dispatcher is dropped; returns the number of turns run
    pub async fn run(mut self) -> usize {
        let mut turns = 0;
        while let Some(request) = self.rx.recv().await {
            let waited = request.received_at.elapsed();
            let span = tracing::info_span!("input", connection_id = %request.origin);
            async {
                tracing::debug!(waited_ms = waited.as_millis() as u64, "Starting turn");
                self.driver.run(&request.text).await;
            }
            .instrument(span)
            .await;
            turns += 1;
        }
        tracing::info!(turns, "Turn worker stopped");
        turns
    }
}
