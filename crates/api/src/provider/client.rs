//! Streaming chat-completion client for the LLM gateway

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Events surfaced while a completion streams
#[derive(Debug)]
pub enum StreamEvent {
    /// A content delta from the model
    Delta(String),
    /// The stream finished normally
    Done,
    /// The stream broke; partial content may already have been delivered
    Error(ProviderError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request to provider failed: {0}")]
    Http(String),
    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Stream decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err.to_string())
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter-compatible chat completions client
pub struct ProviderClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ProviderClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start a streaming completion. Content deltas arrive on the returned
    /// channel; the channel closes after `Done` or `Error`.
    pub async fn stream_completion(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let request = CompletionRequest {
            model: model_id,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.into())).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited; keep the trailing partial line
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        let _ = tx.send(StreamEvent::Done).await;
                        return;
                    }
                    match parse_delta(data) {
                        Ok(Some(delta)) => {
                            if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                                return; // client went away
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // Comment frames and keepalives are not JSON; skip quietly
                            tracing::debug!(error = %e, "Skipping undecodable stream frame");
                        }
                    }
                }
            }

            // Upstream closed without [DONE]; treat as a normal finish
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }
}

fn parse_delta(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(data).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn test_parse_empty_delta() {
        // Role-only first chunk carries no content
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(data).unwrap(), None);

        let data = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_delta(data).unwrap(), None);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_delta(": keepalive").is_err());
    }
}
