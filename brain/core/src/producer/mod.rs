//! Text Producers
//!
//! Reply text comes from a language model behind one of these backends:
//!
//! - **OpenAI**: any OpenAI-compatible chat completions endpoint
//! - **Ollama**: a local Ollama server
//!
//! With no producer the brain simply says back what it heard.
//!
//! # Usage
//!
//! ```ignore
//! use brain_core::producer::{build_producer, ProducerRequest};
//!
//! let producer = build_producer(&config.producer)?.expect("configured");
//! let mut rx = producer.generate(&ProducerRequest::new("hola", "gpt-4o-mini")).await?;
//! while let Some(token) = rx.recv().await { /* ... */ }
//! ```

mod lines;
mod ollama;
mod openai;
mod traits;

use std::sync::Arc;

pub use ollama::OllamaProducer;
pub use openai::OpenAiProducer;
pub use traits::{ProducerRequest, ProducerToken, TextProducer};

use crate::config::{ProducerConfig, ProducerKind};

/// Build the producer the configuration asks for
///
/// Returns `Ok(None)` when no producer is configured, including the OpenAI
/// backend without an API key.
///
/// # Errors
///
/// Fails if the HTTP client cannot be built.
pub fn build_producer(config: &ProducerConfig) -> anyhow::Result<Option<Arc<dyn TextProducer>>> {
    let producer: Arc<dyn TextProducer> = match config.kind {
        ProducerKind::None => {
            tracing::info!("No text producer configured, replies echo the input");
            return Ok(None);
        }
        ProducerKind::OpenAi => {
            let Some(ref api_key) = config.api_key else {
                tracing::warn!("OPENAI_API_KEY not set, replies echo the input");
                return Ok(None);
            };
            Arc::new(OpenAiProducer::new(
                config.base_url.clone(),
                api_key.clone(),
                config.request_timeout,
            )?)
        }
        ProducerKind::Ollama => Arc::new(OllamaProducer::new(
            config.host.clone(),
            config.port,
            config.request_timeout,
        )?),
    };

    tracing::info!(
        producer = producer.name(),
        model = %config.effective_model(),
        "Text producer ready"
    );
    Ok(Some(producer))
}
