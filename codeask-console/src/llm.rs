//! Chat-completion client for OpenAI-compatible servers.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::{Stream, StreamExt};

/// Errors from the generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("chat endpoint unreachable at {url}: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("chat endpoint returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("failed to parse model response: {0}")]
    Parse(String),

    #[error("model returned no content")]
    EmptyResponse,
}

#[derive(Debug, Clone, Serialize)]
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

/// One completion request, fully assembled by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Lazy, finite stream of answer fragments. Consumed once, never restarted.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// The generation collaborator seam; mocked in orchestrator tests.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<AnswerStream, LlmError>;
}

/// HTTP client for a `{server_url}/chat/completions` endpoint.
///
/// Streaming responses arrive as SSE `data:` lines carrying delta fragments;
/// non-streaming responses are a single JSON body, surfaced as a one-fragment
/// stream so the caller handles both shapes identically.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    client: reqwest::Client,
    server_url: String,
}

impl HttpGenerationClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let mut server_url = server_url.into();
        while server_url.ends_with('/') {
            server_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            server_url,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.server_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| LlmError::Unavailable {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(%status, detail, "chat completion request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn complete(&self, request: ChatRequest) -> Result<AnswerStream, LlmError> {
        let response = self.send(&request).await?;

        if request.stream {
            Ok(sse_to_stream(response))
        } else {
            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;
            let content = body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or(LlmError::EmptyResponse)?;
            Ok(Box::pin(stream::iter([Ok(content)])))
        }
    }
}

/// Convert a streaming response body into a fragment stream.
fn sse_to_stream(response: reqwest::Response) -> AnswerStream {
    let events = response.bytes_stream().eventsource();
    Box::pin(events.filter_map(|event| match event {
        Ok(event) => parse_sse_data(&event.data),
        Err(e) => Some(Err(LlmError::Parse(e.to_string()))),
    }))
}

/// One SSE `data:` payload to an optional fragment. `[DONE]` and empty
/// deltas produce nothing.
fn parse_sse_data(data: &str) -> Option<Result<String, LlmError>> {
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(content.to_owned()))
            }
        }
        Err(e) => Some(Err(LlmError::Parse(format!(
            "failed to parse SSE data: {e}"
        )))),
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_expected_fields() {
        let request = ChatRequest {
            model: "local-model".to_string(),
            messages: vec![
                ChatMessage::new("system", "be helpful"),
                ChatMessage::new("user", "hello"),
            ],
            temperature: 0.3,
            max_tokens: 256,
            stream: true,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"local-model\""));
        assert!(json.contains("\"temperature\":0.3"));
        assert!(json.contains("\"stream\":true"));
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn test_parse_sse_text_fragment() {
        let data = r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_data(data).unwrap().unwrap(), "hi");
    }

    #[test]
    fn test_parse_sse_done_and_empty_deltas_are_skipped() {
        assert!(parse_sse_data("[DONE]").is_none());
        let empty = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(parse_sse_data(empty).is_none());
        let blank = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert!(parse_sse_data(blank).is_none());
    }

    #[test]
    fn test_parse_sse_invalid_json_is_an_error() {
        let result = parse_sse_data("not json").unwrap();
        assert!(matches!(result, Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_parse_non_streaming_body() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"The answer."}}]}"#;
        let body: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.choices[0].message.content, "The answer.");
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let client = HttpGenerationClient::new("http://localhost:1234/v1/");
        assert_eq!(client.server_url, "http://localhost:1234/v1");
    }

    #[tokio::test]
    async fn test_unreachable_server_maps_to_unavailable() {
        let client = HttpGenerationClient::new("http://127.0.0.1:1");
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::new("user", "hi")],
            temperature: 0.7,
            max_tokens: 16,
            stream: false,
        };
        let err = match client.complete(request).await {
            Ok(_) => panic!("expected an error for unreachable server"),
            Err(err) => err,
        };
        assert!(matches!(err, LlmError::Unavailable { .. }));
    }
}
