//! Brain - Process-wide Context
//!
//! The `Brain` owns everything that lives as long as the process: the
//! connection registry, the cross-turn emotion memory, the face contract and
//! the turn queue. Transports hold an `Arc<Brain>` and call into it when a
//! face connects, speaks, or goes away.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BrainConfig;
use crate::contract::{FaceContract, LabelResolver};
use crate::dispatcher::{turn_queue, DispatchOutcome, InboundDispatcher, TurnWorker};
use crate::emotion::{EmotionMemory, SharedEmotionMemory};
use crate::messages::OutboundEvent;
use crate::producer::{build_producer, TextProducer};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::turn::TurnDriver;

/// Shared state for one running brain
pub struct Brain {
    registry: ConnectionRegistry,
    dispatcher: InboundDispatcher,
    memory: SharedEmotionMemory,
    resolver: Arc<dyn LabelResolver>,
    producer: Option<Arc<dyn TextProducer>>,
    worker: Option<TurnWorker>,
}

impl Brain {
    /// Assemble a brain from already-built collaborators
    pub fn new(
        config: &BrainConfig,
        resolver: Arc<dyn LabelResolver>,
        producer: Option<Arc<dyn TextProducer>>,
    ) -> Self {
        let registry = ConnectionRegistry::with_send_timeout(config.server.send_timeout);
        let memory = EmotionMemory::shared();

        let mut driver = TurnDriver::new(
            registry.clone(),
            Arc::clone(&resolver),
            config.turn_settings(),
        )
        .with_memory(Arc::clone(&memory));
        if let Some(ref producer) = producer {
            driver = driver.with_producer(Arc::clone(producer));
        }

        let (queue_tx, queue_rx) = turn_queue(config.queue_capacity);
        let dispatcher =
            InboundDispatcher::new(queue_tx, config.max_input_chars, resolver.version());

        Self {
            registry,
            dispatcher,
            memory,
            resolver,
            producer,
            worker: Some(TurnWorker::new(driver, queue_rx)),
        }
    }

    /// Load the contract and producer named by `config` and assemble a brain
    ///
    /// # Errors
    ///
    /// Fails if the contract file is unreadable or malformed, or if the
    /// producer's HTTP client cannot be built.
    pub fn from_config(config: &BrainConfig) -> anyhow::Result<Self> {
        let contract = match config.contract_path {
            Some(ref path) => FaceContract::load(path)
                .with_context(|| format!("loading face contract {}", path.display()))?,
            None => FaceContract::builtin(),
        };
        let producer = build_producer(&config.producer)?;

        Ok(Self::new(config, Arc::new(contract), producer))
    }

    /// Live connections
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Inbound payload handling
    #[must_use]
    pub fn dispatcher(&self) -> &InboundDispatcher {
        &self.dispatcher
    }

    /// Cross-turn emotion memory
    #[must_use]
    pub fn memory(&self) -> &SharedEmotionMemory {
        &self.memory
    }

    /// Version of the face contract in use
    #[must_use]
    pub fn contract_version(&self) -> &str {
        self.resolver.version()
    }

    /// Ask the text producer whether its backend is reachable
    ///
    /// Returns `None` in echo mode.
    pub async fn check_producer(&self) -> Option<bool> {
        let producer = self.producer.as_ref()?;
        let healthy = producer.health_check().await;
        tracing::debug!(producer = producer.name(), healthy, "Producer health check");
        Some(healthy)
    }

    /// Start the turn worker; only the first call does anything
    pub fn spawn_worker(&mut self) -> Option<JoinHandle<usize>> {
        self.worker.take().map(|worker| tokio::spawn(worker.run()))
    }

    /// Greet a new face and add it to the registry
    ///
    /// `contract_info` goes out on the connection's own channel before it is
    /// registered, so it is always the first event the face sees. Returns
    /// `None` if the face vanished before the greeting.
    pub async fn connect(
        &self,
        tx: mpsc::Sender<OutboundEvent>,
        peer: Option<String>,
    ) -> Option<ConnectionId> {
        self.connect_as(ConnectionId::new(), tx, peer).await
    }

    /// Like [`Brain::connect`], for transports that allocate ids themselves
    pub async fn connect_as(
        &self,
        id: ConnectionId,
        tx: mpsc::Sender<OutboundEvent>,
        peer: Option<String>,
    ) -> Option<ConnectionId> {
        if !self.dispatcher.welcome(&tx).await {
            tracing::debug!(connection_id = %id, "Face left before contract_info was sent");
            return None;
        }

        let mut handle = ConnectionHandle::new(id, tx);
        if let Some(peer) = peer {
            handle = handle.with_peer(peer);
        }
        Some(self.registry.register(handle))
    }

    /// Forget a face
    pub fn disconnect(&self, id: &ConnectionId) {
        self.registry.unregister(id);
    }

    /// Handle one inbound payload from a face
    pub fn handle_inbound(&self, id: ConnectionId, raw: &str) -> DispatchOutcome {
        self.dispatcher.dispatch(id, raw)
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("registry", &self.registry)
            .field("contract_version", &self.resolver.version())
            .field("producer", &self.producer.as_ref().map(|p| p.name()))
            .field("worker_started", &self.worker.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProducerKind;
    use crate::messages::StateValue;
    use crate::producer::{ProducerRequest, ProducerToken};
    use async_trait::async_trait;

    /// Backend that never answers
    struct Offline;

    #[async_trait]
    impl TextProducer for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn health_check(&self) -> bool {
            false
        }

        async fn generate(
            &self,
            _request: &ProducerRequest,
        ) -> anyhow::Result<mpsc::Receiver<ProducerToken>> {
            anyhow::bail!("connection refused")
        }
    }

    fn echo_config() -> BrainConfig {
        let mut config = BrainConfig::default();
        config.producer.kind = ProducerKind::None;
        config
    }

    #[tokio::test]
    async fn test_from_config_uses_builtin_contract() {
        let brain = Brain::from_config(&echo_config()).unwrap();
        assert_eq!(brain.contract_version(), "builtin");
    }

    #[tokio::test]
    async fn test_from_config_rejects_malformed_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faceContract.json");
        std::fs::write(&path, "{").unwrap();

        let mut config = echo_config();
        config.contract_path = Some(path);
        assert!(Brain::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_check_producer() {
        let echo = Brain::from_config(&echo_config()).unwrap();
        assert_eq!(echo.check_producer().await, None);

        let contract = Arc::new(FaceContract::builtin());
        let offline = Brain::new(&BrainConfig::default(), contract, Some(Arc::new(Offline)));
        assert_eq!(offline.check_producer().await, Some(false));
    }

    #[tokio::test]
    async fn test_connect_greets_then_registers() {
        let brain = Brain::from_config(&echo_config()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let id = brain.connect(tx, Some("127.0.0.1:5000".to_string())).await.unwrap();

        assert!(brain.registry().contains(&id));
        assert_eq!(rx.recv().await, Some(OutboundEvent::contract_info("builtin")));

        brain.disconnect(&id);
        assert!(brain.registry().is_empty());
    }

    #[tokio::test]
    async fn test_connect_after_face_left() {
        let brain = Brain::from_config(&echo_config()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        assert!(brain.connect(tx, None).await.is_none());
        assert!(brain.registry().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_input_runs_a_turn() {
        let mut brain = Brain::from_config(&echo_config()).unwrap();
        let worker = brain.spawn_worker().unwrap();
        assert!(brain.spawn_worker().is_none());

        let (tx, mut rx) = mpsc::channel(64);
        let id = brain.connect(tx, None).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundEvent::contract_info("builtin")));

        let outcome = brain.handle_inbound(id, r#"{"type": "input", "text": "hola"}"#);
        assert_eq!(outcome, DispatchOutcome::Queued);

        assert_eq!(rx.recv().await, Some(OutboundEvent::state(StateValue::Thinking)));
        assert_eq!(rx.recv().await, Some(OutboundEvent::state(StateValue::Speaking)));
        assert_eq!(rx.recv().await, Some(OutboundEvent::message("hola")));

        drop(brain);
        assert_eq!(worker.await.unwrap(), 1);
    }
}
