//! Emotion Decision Engine
//!
//! Picks at most one eye expression per turn while the reply is still
//! arriving. The engine is fed the accumulated reply text every time a chunk
//! goes out and once more when the stream ends, and it has to commit before
//! a deadline.
//!
//! # States
//!
//! ```text
//!   Open ──(text too short, before deadline)──► WaitingThreshold
//!    │                                              │
//!    └──────(strong tone | deadline | enough text)──┴──► Closed
//! ```
//!
//! `Closed` is terminal: later evaluations return nothing.
//!
//! # Hysteresis
//!
//! [`EmotionMemory`] survives across turns. A strong tone is only emitted
//! when it differs from the last emitted one. A weak tone emits the neutral
//! fallback, but not while a previous emission is still inside the hold
//! window and never twice in a row.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Coarse emotional category of a piece of text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Laughter, thanks, enthusiasm
    Positive,
    /// Apologies and sadness
    Negative,
    /// Warnings and anger
    Alarmed,
    /// Astonishment
    Surprised,
    /// Doubt or a question
    Questioning,
    /// Nothing recognisable
    Neutral,
}

impl Tone {
    /// Category emitted when a turn carries no strong signal
    pub const FALLBACK: Tone = Tone::Neutral;

    /// Strong tones close the decision immediately
    #[must_use]
    pub fn is_strong(self) -> bool {
        !matches!(self, Self::Questioning | Self::Neutral)
    }

    /// Expression label shown on the face
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Positive => "happy",
            Self::Negative => "sad",
            Self::Alarmed => "angry",
            Self::Surprised => "surprised",
            Self::Questioning => "thinking",
            Self::Neutral => "neutral",
        }
    }

    /// How long a strong expression stays on the face
    #[must_use]
    pub fn duration_ms(self) -> Option<u32> {
        match self {
            Self::Positive => Some(2000),
            Self::Negative => Some(2500),
            Self::Alarmed | Self::Surprised => Some(1500),
            Self::Questioning | Self::Neutral => None,
        }
    }
}

/// Keyword tables used to classify text, checked in priority order
#[derive(Debug, Clone)]
pub struct ToneLexicon {
    entries: Vec<(Tone, Vec<String>)>,
}

impl Default for ToneLexicon {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|w| (*w).to_string()).collect()
        }

        Self {
            entries: vec![
                (
                    Tone::Positive,
                    words(&[
                        "jaja", "jeje", "haha", "genial", "perfecto", "excelente", "me alegra",
                        "feliz", "gracias", "chiste", "gracioso", "great", "awesome", "glad",
                        "love", "joke", "funny", "😂", "🤣", "😄",
                    ]),
                ),
                (
                    Tone::Negative,
                    words(&[
                        "lo siento", "perdón", "perdona", "lamento", "lamentablemente", "triste",
                        "disculpa", "llorar", "sorry", "apolog", "unfortunately", "sad",
                    ]),
                ),
                (
                    Tone::Alarmed,
                    words(&[
                        "cuidado", "peligro", "urgente", "alerta", "emergencia", "enojado",
                        "furioso", "danger", "warning", "careful", "watch out", "urgent", "angry",
                    ]),
                ),
                (
                    Tone::Surprised,
                    words(&[
                        "wow", "guau", "sorpresa", "increíble", "no puedo creer", "surprise",
                        "amazing", "incredible", "😮",
                    ]),
                ),
                (
                    Tone::Questioning,
                    words(&["?", "¿", "hmm", "no estoy seguro", "quizás", "not sure", "maybe"]),
                ),
            ],
        }
    }
}

impl ToneLexicon {
    /// Build a lexicon from explicit tables (priority = order given)
    #[must_use]
    pub fn new(entries: Vec<(Tone, Vec<String>)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(tone, list)| (tone, list.into_iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        Self { entries }
    }

    /// Classify text; the first category with a matching keyword wins
    #[must_use]
    pub fn classify(&self, text: &str) -> Tone {
        if text.trim().is_empty() {
            return Tone::Neutral;
        }
        let lowered = text.to_lowercase();
        self.entries
            .iter()
            .find(|(_, list)| list.iter().any(|w| lowered.contains(w.as_str())))
            .map_or(Tone::Neutral, |(tone, _)| *tone)
    }
}

/// Timing knobs for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionSettings {
    /// Time after turn start at which a weak tone is decided anyway
    pub decision_timeout: Duration,
    /// A weak tone inside this window after an emission emits nothing
    pub hold_window: Duration,
    /// Characters needed before a weak tone is decided early
    pub min_signal_chars: usize,
    /// Duration attached to the fallback expression
    pub fallback_duration_ms: u32,
}

impl Default for EmotionSettings {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_millis(1200),
            hold_window: Duration::from_millis(1500),
            min_signal_chars: 24,
            fallback_duration_ms: 1200,
        }
    }
}

/// Cross-turn memory of the last emitted expression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmotionMemory {
    /// Last tone actually emitted
    pub last_tone: Option<Tone>,
    /// When it was emitted
    pub last_emitted_at: Option<Instant>,
}

impl EmotionMemory {
    /// Shared handle for a fresh process
    #[must_use]
    pub fn shared() -> SharedEmotionMemory {
        Arc::new(Mutex::new(Self::default()))
    }

    fn within_hold(&self, now: Instant, hold: Duration) -> bool {
        self.last_emitted_at
            .is_some_and(|at| now.saturating_duration_since(at) < hold)
    }

    fn record(&mut self, tone: Tone, now: Instant) {
        self.last_tone = Some(tone);
        self.last_emitted_at = Some(now);
    }
}

/// Memory shared by every turn in the process
pub type SharedEmotionMemory = Arc<Mutex<EmotionMemory>>;

/// Where the engine is in its one-shot decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionState {
    /// No decision yet
    Open,
    /// Weak tone seen but too little text to decide before the deadline
    WaitingThreshold,
    /// Decided; nothing further happens this turn
    Closed,
}

/// An expression the engine chose to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionDecision {
    /// Tone behind the expression
    pub tone: Tone,
    /// Expression label before contract resolution
    pub label: &'static str,
    /// Display duration
    pub duration_ms: u32,
}

/// Turn-scoped decision engine
#[derive(Debug)]
pub struct EmotionEngine {
    state: DecisionState,
    deadline: Instant,
    settings: EmotionSettings,
    memory: SharedEmotionMemory,
    lexicon: Arc<ToneLexicon>,
    emitted: Option<EmotionDecision>,
}

impl EmotionEngine {
    /// Start a decision for a turn that begins at `now`
    #[must_use]
    pub fn start(
        now: Instant,
        settings: EmotionSettings,
        memory: SharedEmotionMemory,
        lexicon: Arc<ToneLexicon>,
    ) -> Self {
        Self {
            state: DecisionState::Open,
            deadline: now + settings.decision_timeout,
            settings,
            memory,
            lexicon,
            emitted: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DecisionState {
        self.state
    }

    /// True once the decision is final
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == DecisionState::Closed
    }

    /// Instant after which a weak tone is decided regardless of length
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// What was emitted this turn, if anything
    #[must_use]
    pub fn emitted(&self) -> Option<EmotionDecision> {
        self.emitted
    }

    /// Evaluate the accumulated reply at `now`
    pub fn evaluate(&mut self, text: &str, now: Instant) -> Option<EmotionDecision> {
        let deadline_reached = now >= self.deadline;
        self.decide(text, deadline_reached, now)
    }

    /// Evaluate as if the deadline had passed (end of stream)
    pub fn force(&mut self, text: &str, now: Instant) -> Option<EmotionDecision> {
        self.decide(text, true, now)
    }

    fn decide(
        &mut self,
        text: &str,
        deadline_reached: bool,
        now: Instant,
    ) -> Option<EmotionDecision> {
        if self.is_closed() {
            return None;
        }

        let tone = self.lexicon.classify(text);

        // Held for the whole decision so the memory update and the emission
        // it records are one step.
        let shared = Arc::clone(&self.memory);
        let mut memory = shared.lock();

        if tone.is_strong() {
            let decision = if memory.last_tone == Some(tone) {
                tracing::debug!(?tone, "Strong tone already showing");
                None
            } else {
                memory.record(tone, now);
                Some(EmotionDecision {
                    tone,
                    label: tone.label(),
                    duration_ms: tone.duration_ms().unwrap_or(self.settings.fallback_duration_ms),
                })
            };
            return self.close(decision);
        }

        if !deadline_reached && text.trim().chars().count() < self.settings.min_signal_chars {
            self.state = DecisionState::WaitingThreshold;
            return None;
        }

        if memory.within_hold(now, self.settings.hold_window) {
            tracing::debug!(?tone, "Weak tone inside hold window");
            return self.close(None);
        }

        if memory.last_tone == Some(Tone::FALLBACK) {
            return self.close(None);
        }

        memory.record(Tone::FALLBACK, now);
        self.close(Some(EmotionDecision {
            tone: Tone::FALLBACK,
            label: Tone::FALLBACK.label(),
            duration_ms: self.settings.fallback_duration_ms,
        }))
    }

    fn close(&mut self, decision: Option<EmotionDecision>) -> Option<EmotionDecision> {
        self.state = DecisionState::Closed;
        self.emitted = decision;
        decision
    }
}
