//! OpenAI-compatible Producer
//!
//! Streams chat completions as server-sent events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Ho"}}]}
//!
//! data: {"choices":[{"delta":{"content":"la"}}]}
//!
//! data: [DONE]
//! ```

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::lines::LineBuffer;
use super::traits::{ProducerRequest, ProducerToken, TextProducer};

#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// What one SSE line means for the stream
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    /// Blank line, comment, or an event with no text
    Skip,
    /// Reply text
    Content(String),
    /// `[DONE]` marker
    Done,
    /// Error object from the API
    Failed(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(data) = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
        .map(str::trim)
    else {
        return SseLine::Skip;
    };

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChunkEnvelope>(data) {
        Ok(ChunkEnvelope {
            error: Some(error), ..
        }) => SseLine::Failed(error.message),
        Ok(envelope) => envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map_or(SseLine::Skip, SseLine::Content),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable SSE data");
            SseLine::Skip
        }
    }
}

/// OpenAI chat completions client
#[derive(Clone)]
pub struct OpenAiProducer {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiProducer {
    /// Create a producer for an OpenAI-compatible API
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn request_body(request: &ProducerRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

/// Handle one SSE line; returns false once the stream is over
async fn forward(line: &str, full: &mut String, tx: &mpsc::Sender<ProducerToken>) -> bool {
    match parse_sse_line(line) {
        SseLine::Skip => true,
        SseLine::Content(text) => {
            full.push_str(&text);
            tx.send(ProducerToken::Fragment(text)).await.is_ok()
        }
        SseLine::Done => {
            let _ = tx
                .send(ProducerToken::Complete {
                    text: std::mem::take(full),
                })
                .await;
            false
        }
        SseLine::Failed(message) => {
            let _ = tx.send(ProducerToken::Error(message)).await;
            false
        }
    }
}

/// Forward an SSE body into `tx` until `[DONE]`, an error, or the end
async fn pump<S, B, E>(mut body: S, tx: mpsc::Sender<ProducerToken>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut lines = LineBuffer::new();
    let mut full = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(ProducerToken::Error(e.to_string())).await;
                return;
            }
        };

        for line in lines.push(bytes.as_ref()) {
            if !forward(&line, &mut full, &tx).await {
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        forward(&line, &mut full, &tx).await;
    }
}

#[async_trait]
impl TextProducer for OpenAiProducer {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn generate(
        &self,
        request: &ProducerRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProducerToken>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI returned {status}: {body}");
        }

        tokio::spawn(pump(response.bytes_stream(), tx));
        Ok(rx)
    }
}
