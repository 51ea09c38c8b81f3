//! Ollama Producer
//!
//! Streams replies from a local Ollama server through `/api/generate`, which
//! answers with newline-delimited JSON:
//!
//! ```text
//! {"response":"Ho","done":false}
//! {"response":"la","done":false}
//! {"response":"","done":true}
//! ```

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::lines::LineBuffer;
use super::traits::{ProducerRequest, ProducerToken, TextProducer};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateLine {
    response: Option<String>,
    done: bool,
    error: Option<String>,
}

/// Ollama HTTP client
#[derive(Clone)]
pub struct OllamaProducer {
    host: String,
    port: u16,
    http_client: reqwest::Client,
}

impl OllamaProducer {
    /// Create a producer for `host:port`
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            host: host.into(),
            port,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    fn request_body(request: &ProducerRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": true,
        });
        if let Some(ref system) = request.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["options"] = serde_json::json!({ "temperature": temperature });
        }
        body
    }
}

/// Handle one NDJSON record; returns false once the stream is over
async fn forward(line: &str, full: &mut String, tx: &mpsc::Sender<ProducerToken>) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }

    let parsed = match serde_json::from_str::<GenerateLine>(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable Ollama line");
            return true;
        }
    };

    if let Some(error) = parsed.error {
        let _ = tx.send(ProducerToken::Error(error)).await;
        return false;
    }

    if let Some(text) = parsed.response.filter(|t| !t.is_empty()) {
        full.push_str(&text);
        if tx.send(ProducerToken::Fragment(text)).await.is_err() {
            // Receiver dropped, stop streaming
            return false;
        }
    }

    if parsed.done {
        let _ = tx
            .send(ProducerToken::Complete {
                text: std::mem::take(full),
            })
            .await;
        return false;
    }

    true
}

/// Forward an NDJSON body into `tx` until `done`, an error, or the end
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
impl TextProducer for OllamaProducer {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
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
            .post(self.generate_url())
            .json(&Self::request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        tokio::spawn(pump(response.bytes_stream(), tx));
        Ok(rx)
    }
}
