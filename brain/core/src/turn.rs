//! Turn Driver
//!
//! Runs one input-to-reply cycle and broadcasts everything the faces see
//! along the way.
//!
//! # Event Order
//!
//! Streaming (a producer is configured):
//!
//! ```text
//! state(thinking) state(speaking) message_start(id)
//!   message_chunk(id, 0) .. message_chunk(id, k-1)   (emotion may land between chunks)
//! [emotion] message_end(id) speaking_end
//! ```
//!
//! Echo (no producer): the input is the reply.
//!
//! ```text
//! state(thinking) state(speaking) message(text) [emotion] speaking_end
//! ```
//!
//! Producer trouble (failure to start, an error token, a fragment that never
//! arrives) cuts the reply short but never skips `message_end` or
//! `speaking_end`; a face must not be left talking.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, timeout, Instant};
use tracing::Instrument;

use crate::contract::LabelResolver;
use crate::emotion::{
    EmotionDecision, EmotionEngine, EmotionMemory, EmotionSettings, SharedEmotionMemory,
    ToneLexicon,
};
use crate::messages::{OutboundEvent, ResponseId, StateValue};
use crate::producer::{ProducerRequest, ProducerToken, TextProducer};
use crate::registry::ConnectionRegistry;
use crate::splitter::{Chunk, ChunkSplitter, DEFAULT_BOUNDARIES};

/// Per-turn knobs
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    /// Emotion engine timing
    pub emotion: EmotionSettings,
    /// Chunk boundary characters
    pub boundaries: Vec<char>,
    /// Longest wait for the next fragment
    pub fragment_timeout: Duration,
    /// Model requested from the producer
    pub model: String,
    /// System prompt sent with every request
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            emotion: EmotionSettings::default(),
            boundaries: DEFAULT_BOUNDARIES.chars().collect(),
            fragment_timeout: Duration::from_secs(15),
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            temperature: None,
        }
    }
}

/// Lifecycle of a single turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Phase events going out, decision clock started
    Started,
    /// Reply text being delivered
    Streaming,
    /// Terminal events sent
    Finished,
}

/// Summary of a finished turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// Response id (only sent to faces when streaming)
    pub response_id: ResponseId,
    /// Whether the chunked form was used
    pub streamed: bool,
    /// Reply text as delivered
    pub reply: String,
    /// Number of chunks sent
    pub chunks: u32,
    /// Expression the engine chose, if any
    pub emotion: Option<EmotionDecision>,
    /// Label actually sent for that expression
    pub emotion_value: Option<String>,
    /// The producer stopped before finishing
    pub ended_early: bool,
}

/// Drives turns against the shared registry, producer and emotion memory
pub struct TurnDriver {
    registry: ConnectionRegistry,
    producer: Option<Arc<dyn TextProducer>>,
    resolver: Arc<dyn LabelResolver>,
    memory: SharedEmotionMemory,
    lexicon: Arc<ToneLexicon>,
    settings: TurnSettings,
}

impl TurnDriver {
    /// Create a driver that echoes input (no producer)
    pub fn new(
        registry: ConnectionRegistry,
        resolver: Arc<dyn LabelResolver>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            registry,
            producer: None,
            resolver,
            memory: EmotionMemory::shared(),
            lexicon: Arc::new(ToneLexicon::default()),
            settings,
        }
    }

    /// Use `producer` for replies
    #[must_use]
    pub fn with_producer(mut self, producer: Arc<dyn TextProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Share an existing emotion memory
    #[must_use]
    pub fn with_memory(mut self, memory: SharedEmotionMemory) -> Self {
        self.memory = memory;
        self
    }

    /// Replace the tone keyword tables
    #[must_use]
    pub fn with_lexicon(mut self, lexicon: ToneLexicon) -> Self {
        self.lexicon = Arc::new(lexicon);
        self
    }

    /// Cross-turn emotion memory
    #[must_use]
    pub fn memory(&self) -> &SharedEmotionMemory {
        &self.memory
    }

    /// Run one full turn for `input`
    pub async fn run(&self, input: &str) -> TurnReport {
        let response_id = ResponseId::new();
        let span = tracing::info_span!("turn", response_id = %response_id);
        self.run_turn(input, response_id).instrument(span).await
    }

    async fn run_turn(&self, input: &str, response_id: ResponseId) -> TurnReport {
        enter(TurnPhase::Started);
        self.send(OutboundEvent::state(StateValue::Thinking)).await;
        self.send(OutboundEvent::state(StateValue::Speaking)).await;

        let mut engine = EmotionEngine::start(
            Instant::now(),
            self.settings.emotion,
            Arc::clone(&self.memory),
            Arc::clone(&self.lexicon),
        );

        enter(TurnPhase::Streaming);
        let mut report = match self.producer {
            Some(ref producer) => {
                self.stream_reply(producer.as_ref(), input, response_id, &mut engine)
                    .await
            }
            None => self.echo_reply(input, response_id, &mut engine).await,
        };
        report.emotion = engine.emitted();

        enter(TurnPhase::Finished);
        self.send(OutboundEvent::speaking_end()).await;

        tracing::info!(
            streamed = report.streamed,
            chunks = report.chunks,
            reply_chars = report.reply.chars().count(),
            emotion = report.emotion_value.as_deref().unwrap_or("-"),
            ended_early = report.ended_early,
            "Turn finished"
        );
        report
    }

    async fn echo_reply(
        &self,
        input: &str,
        response_id: ResponseId,
        engine: &mut EmotionEngine,
    ) -> TurnReport {
        let decision = engine.force(input, Instant::now());
        self.send(OutboundEvent::message(input)).await;

        let emotion_value = match decision {
            Some(decision) => Some(self.send_emotion(decision).await),
            None => None,
        };

        TurnReport {
            response_id,
            streamed: false,
            reply: input.to_string(),
            chunks: 0,
            emotion: None,
            emotion_value,
            ended_early: false,
        }
    }

    async fn stream_reply(
        &self,
        producer: &dyn TextProducer,
        input: &str,
        response_id: ResponseId,
        engine: &mut EmotionEngine,
    ) -> TurnReport {
        self.send(OutboundEvent::message_start(response_id.clone())).await;

        let mut splitter = ChunkSplitter::new(self.settings.boundaries.iter().copied());
        let mut reply = String::new();
        let mut emotion_value = None;
        let mut ended_early = false;

        let request = self.request(input);
        let started = {
            let generate = producer.generate(&request);
            tokio::pin!(generate);
            loop {
                tokio::select! {
                    result = &mut generate => break result,
                    () = sleep_until(engine.deadline()), if !engine.is_closed() => {
                        if let Some(value) = self.decide_at_deadline(engine, &reply).await {
                            emotion_value = Some(value);
                        }
                    }
                }
            }
        };

        match started {
            Err(e) => {
                tracing::warn!(
                    producer = producer.name(),
                    error = %e,
                    "Failed to start reply stream"
                );
                ended_early = true;
            }
            Ok(mut rx) => loop {
                let deadline = engine.deadline();
                let next = tokio::select! {
                    token = timeout(self.settings.fragment_timeout, rx.recv()) => Some(token),
                    () = sleep_until(deadline), if !engine.is_closed() => None,
                };

                match next {
                    None => {
                        if let Some(value) = self.decide_at_deadline(engine, &reply).await {
                            emotion_value = Some(value);
                        }
                    }
                    Some(Err(_)) => {
                        tracing::warn!(
                            timeout_ms = self.settings.fragment_timeout.as_millis() as u64,
                            "Timed out waiting for the next fragment"
                        );
                        ended_early = true;
                        break;
                    }
                    Some(Ok(None) | Ok(Some(ProducerToken::Complete { .. }))) => break,
                    Some(Ok(Some(ProducerToken::Error(e)))) => {
                        tracing::warn!(
                            producer = producer.name(),
                            error = %e,
                            "Reply stream failed"
                        );
                        ended_early = true;
                        break;
                    }
                    Some(Ok(Some(ProducerToken::Fragment(text)))) => {
                        reply.push_str(&text);
                        for chunk in splitter.push(&text) {
                            self.send_chunk(&response_id, chunk).await;
                            if let Some(decision) = engine.evaluate(&reply, Instant::now()) {
                                emotion_value = Some(self.send_emotion(decision).await);
                            }
                        }
                    }
                }
            },
        }

        if let Some(chunk) = splitter.finish() {
            self.send_chunk(&response_id, chunk).await;
        }
        if let Some(decision) = engine.force(&reply, Instant::now()) {
            emotion_value = Some(self.send_emotion(decision).await);
        }
        self.send(OutboundEvent::message_end(response_id.clone())).await;

        TurnReport {
            response_id,
            streamed: true,
            reply,
            chunks: splitter.emitted(),
            emotion: None,
            emotion_value,
            ended_early,
        }
    }

    /// Evaluate the reply so far once the decision deadline has fired
    async fn decide_at_deadline(&self, engine: &mut EmotionEngine, reply: &str) -> Option<String> {
        let decision = engine.evaluate(reply, Instant::now())?;
        Some(self.send_emotion(decision).await)
    }

    fn request(&self, input: &str) -> ProducerRequest {
        let mut request = ProducerRequest::new(input, self.settings.model.clone());
        if let Some(ref system) = self.settings.system_prompt {
            request = request.with_system(system.clone());
        }
        if let Some(temperature) = self.settings.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    async fn send(&self, event: OutboundEvent) {
        self.registry.broadcast(&event).await;
    }

    async fn send_chunk(&self, response_id: &ResponseId, chunk: Chunk) {
        self.send(OutboundEvent::message_chunk(
            response_id.clone(),
            chunk.index,
            chunk.text,
        ))
        .await;
    }

    /// Broadcast a decision, preferring the contract's canonical label
    async fn send_emotion(&self, decision: EmotionDecision) -> String {
        let value = self.resolver.normalize(decision.label).unwrap_or_else(|| {
            tracing::warn!(
                label = decision.label,
                contract_version = self.resolver.version(),
                "Emotion label not in face contract, sending raw"
            );
            decision.label.to_string()
        });

        tracing::debug!(tone = ?decision.tone, value = %value, "Emotion chosen");
        self.send(OutboundEvent::emotion(value.clone(), Some(decision.duration_ms)))
            .await;
        value
    }
}

fn enter(phase: TurnPhase) {
    tracing::debug!(?phase, "Turn phase");
}

impl std::fmt::Debug for TurnDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnDriver")
            .field("producer", &self.producer.as_ref().map(|p| p.name().to_string()))
            .field("contract_version", &self.resolver.version())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
