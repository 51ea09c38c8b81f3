//! Text Producer Traits
//!
//! The brain does not care where reply text comes from. A producer takes a
//! prompt and hands back a channel of fragments that fill up while the HTTP
//! body streams in.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Items delivered by a producer stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProducerToken {
    /// Next piece of reply text
    Fragment(String),
    /// Stream finished normally
    Complete {
        /// Full reply as the backend reports it
        text: String,
    },
    /// Stream failed; nothing else follows
    Error(String),
}

/// One reply request
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerRequest {
    /// User utterance
    pub prompt: String,
    /// Backend-specific model identifier
    pub model: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Sampling temperature; `None` keeps the backend default
    pub temperature: Option<f32>,
}

impl ProducerRequest {
    /// Create a request for `prompt` on `model`
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system: None,
            temperature: None,
        }
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }
}

/// Source of streamed reply text
///
/// The returned receiver yields fragments in order. It closes after a
/// `Complete` or `Error` token, or when the body ends; a stream is never
/// restarted.
#[async_trait]
pub trait TextProducer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Start generating a reply
    async fn generate(
        &self,
        request: &ProducerRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProducerToken>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ProducerRequest::new("hola", "gpt-4o-mini")
            .with_system("Eres BMO")
            .with_temperature(5.0);

        assert_eq!(request.prompt, "hola");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.system.as_deref(), Some("Eres BMO"));
        assert_eq!(request.temperature, Some(2.0));
    }
}
