//! Streaming generation provider abstraction and the OpenAI implementation.
//!
//! The pipeline hands the assembled message history to a
//! [`GenerationProvider`] and relays the returned delta stream to the
//! caller. The stream is lazy, finite, and non-restartable: each item is
//! one text delta in arrival order, an `Err` item terminates it, and it
//! ends cleanly on the provider's completion signal.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::GenerationConfig;

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// An ordered sequence of text deltas, terminated by an end signal or an
/// error item.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Produces a streamed completion for an ordered message history.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn stream(&self, messages: &[Message]) -> Result<DeltaStream>;
}

/// Generation provider backed by the OpenAI chat completions API with
/// `stream: true`. Construction fails fast if `OPENAI_API_KEY` is not set.
pub struct OpenAIGeneration {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGeneration {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        // Overall request timeout would cut long streams short; bound the
        // connection phase only.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGeneration {
    async fn stream(&self, messages: &[Message]) -> Result<DeltaStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(16);
        tokio::spawn(relay_sse(response.bytes_stream(), tx));

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

/// Read the SSE byte stream, extract text deltas, and forward them until
/// the `[DONE]` marker, an error, or the consumer hangs up.
async fn relay_sse<S>(bytes: S, tx: mpsc::Sender<Result<String>>)
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>>,
{
    futures::pin_mut!(bytes);
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(next) = bytes.next().await {
        let data = match next {
            Ok(data) => data,
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };
        buffer.extend_from_slice(&data);

        // Only complete lines are parsed; a multi-byte character never
        // straddles a newline, so per-line UTF-8 decoding is safe.
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end();

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();

            if payload == "[DONE]" {
                return;
            }

            match parse_delta(payload) {
                Ok(Some(delta)) => {
                    if tx.send(Ok(delta)).await.is_err() {
                        // Consumer disconnected; stop reading.
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}

/// Extract the text delta from one SSE event payload, if any.
fn parse_delta(payload: &str) -> Result<Option<String>> {
    let json: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| anyhow::anyhow!("Invalid stream event: {}", e))?;

    if let Some(error) = json.get("error") {
        bail!("Generation stream error: {}", error);
    }

    Ok(json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_with_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_delta_role_only_event() {
        let payload = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), None);
    }

    #[test]
    fn test_parse_delta_finish_event() {
        let payload = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_delta(payload).unwrap(), None);
    }

    #[test]
    fn test_parse_delta_error_event() {
        let payload = r#"{"error":{"message":"overloaded"}}"#;
        assert!(parse_delta(payload).is_err());
    }

    #[test]
    fn test_parse_delta_invalid_json() {
        assert!(parse_delta("not json").is_err());
    }

    #[tokio::test]
    async fn test_relay_sse_forwards_deltas_until_done() {
        let events = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok(bytes::Bytes::from(events))]);
        let (tx, mut rx) = mpsc::channel(16);

        relay_sse(byte_stream, tx).await;

        let mut deltas = Vec::new();
        while let Some(item) = rx.recv().await {
            deltas.push(item.unwrap());
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_relay_sse_split_across_network_chunks() {
        let chunks = vec![
            Ok(bytes::Bytes::from("data: {\"choices\":[{\"delta\":")),
            Ok(bytes::Bytes::from("{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n")),
        ];
        let byte_stream = futures::stream::iter(chunks);
        let (tx, mut rx) = mpsc::channel(16);

        relay_sse(byte_stream, tx).await;

        assert_eq!(rx.recv().await.unwrap().unwrap(), "ok");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_relay_sse_error_event_terminates() {
        let events = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok(bytes::Bytes::from(events))]);
        let (tx, mut rx) = mpsc::channel(16);

        relay_sse(byte_stream, tx).await;

        // Partial output already relayed stands; the error follows it.
        assert_eq!(rx.recv().await.unwrap().unwrap(), "partial");
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }
}
