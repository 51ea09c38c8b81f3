//! Brain Core - Turn Engine for BMO's Face
//!
//! This crate turns one user utterance into the stream of events an animated
//! face needs: phase changes, reply text split into speakable chunks, a
//! single chosen eye expression, and the end-of-speech signal. It knows
//! nothing about sockets; faces are represented by channels.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Faces (WebSocket)                          │
//! │   ┌────────┐   ┌────────┐   ┌────────┐                           │
//! │   │ face 1 │   │ face 2 │   │ face 3 │                           │
//! │   └───┬────┘   └───┬────┘   └───┬────┘                           │
//! │       │  InboundEvent (up)  OutboundEvent (down)                 │
//! └───────┼────────────┼────────────┼────────────────────────────────┘
//!         │            │            │
//! ┌───────┼────────────┼────────────┼────────────────────────────────┐
//! │       ▼            ▼            ▼          BRAIN CORE            │
//! │  ┌───────────────────────┐      ┌────────────────────────────┐   │
//! │  │  InboundDispatcher    │─────►│  turn queue ─► TurnWorker  │   │
//! │  └───────────────────────┘      └─────────────┬──────────────┘   │
//! │                                               ▼                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │ TextProducer │─►│  TurnDriver  │─►│ ChunkSplitter        │    │
//! │  │ (LLM / echo) │  │              │─►│ EmotionEngine        │    │
//! │  └──────────────┘  └──────┬───────┘  └──────────────────────┘    │
//! │                           ▼                                      │
//! │                 ConnectionRegistry::broadcast                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Brain`]: process-wide context owning the registry, memory and queue
//! - [`OutboundEvent`]: events sent from the brain to faces
//! - [`InboundEvent`]: events sent from faces to the brain
//! - [`ConnectionRegistry`]: live faces and broadcast with pruning
//! - [`ChunkSplitter`]: reply text to indexed chunks
//! - [`EmotionEngine`]: one expression per turn, with hysteresis
//! - [`TurnDriver`]: runs one turn end to end
//!
//! # Quick Start
//!
//! ```ignore
//! use brain_core::{load_config, Brain};
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let mut brain = Brain::from_config(&config)?;
//! brain.spawn_worker();
//!
//! let (tx, mut rx) = mpsc::channel(256);
//! let id = brain.connect(tx, None).await.expect("face still there");
//! brain.handle_inbound(id, r#"{"type":"input","text":"hola"}"#);
//! while let Some(event) = rx.recv().await {
//!     println!("{}", event.to_json()?);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`codec`]: JSON wire encoding with strict discriminants
//! - [`messages`]: brain -> face events
//! - [`events`]: face -> brain events
//! - [`registry`]: connection registry and broadcast
//! - [`splitter`]: chunk splitting at speaking boundaries
//! - [`emotion`]: tone classification and the decision engine
//! - [`turn`]: the turn driver
//! - [`dispatcher`]: inbound parsing and the turn queue
//! - [`contract`]: the shared face contract
//! - [`producer`]: text producer backends (OpenAI, Ollama)
//! - [`config`]: TOML/env configuration
//! - [`brain`]: the process-wide context

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod brain;
pub mod codec;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod emotion;
pub mod events;
pub mod messages;
pub mod producer;
pub mod registry;
pub mod splitter;
pub mod turn;

// Re-exports for convenience
pub use brain::Brain;
pub use codec::{CodecError, WireEvent, MAX_PAYLOAD_SIZE};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, BrainConfig,
    BrainToml, ConfigError, ConfigOverrides, ConfigSource, ProducerConfig, ProducerKind,
    ServerConfig,
};
pub use contract::{ContractError, FaceContract, FacePreset, LabelResolver};
pub use dispatcher::{DispatchOutcome, InboundDispatcher, RejectReason, TurnRequest, TurnWorker};
pub use emotion::{
    DecisionState, EmotionDecision, EmotionEngine, EmotionMemory, EmotionSettings,
    SharedEmotionMemory, Tone, ToneLexicon,
};
pub use events::InboundEvent;
pub use messages::{OutboundEvent, ResponseId, StateValue};
pub use producer::{ProducerRequest, ProducerToken, TextProducer};
pub use registry::{BroadcastResult, ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use splitter::{Chunk, ChunkSplitter, DEFAULT_BOUNDARIES};
pub use turn::{TurnDriver, TurnPhase, TurnReport, TurnSettings};
