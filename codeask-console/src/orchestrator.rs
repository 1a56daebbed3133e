//! Answer orchestration: retrieval, prompt assembly, generation, history.

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, ChatRequest, GenerationClient};
use anyhow::Context;
use codeask_retriever::{ContextManager, Retriever, ScoredChunk};
use std::sync::Arc;
use tokio_stream::StreamExt;

/// Placeholder substituted when the store has nothing to offer.
const NO_CONTEXT: &str = "No context found.";
/// Separator between retrieved chunks inside the prompt.
const CHUNK_SEPARATOR: &str = "\n---\n";

/// Turns a question into an answered, recorded exchange.
///
/// Prompt assembly is deterministic: retrieve, format, substitute into the
/// template, then send system prompt + history + composed user prompt. The
/// exchange is appended to the active session only after the full answer
/// streamed successfully; any failure leaves session state untouched.
pub struct AnswerOrchestrator {
    retriever: Retriever,
    client: Arc<dyn GenerationClient>,
    llm: LlmConfig,
}

impl AnswerOrchestrator {
    pub fn new(retriever: Retriever, client: Arc<dyn GenerationClient>, llm: LlmConfig) -> Self {
        Self {
            retriever,
            client,
            llm,
        }
    }

    /// Answer `question`, feeding fragments to `sink` as they arrive.
    /// Returns the complete answer text.
    pub async fn answer(
        &self,
        sessions: &ContextManager,
        question: &str,
        mut sink: impl FnMut(&str),
    ) -> anyhow::Result<String> {
        let chunks = self
            .retriever
            .retrieve(question)
            .await
            .context("context retrieval failed")?;
        let context_text = format_chunks(&chunks);
        let prompt = compose_prompt(&self.llm.master_prompt_template, &context_text, question);

        let mut messages = vec![ChatMessage::new("system", &self.llm.system_prompt)];
        if sessions.context_enabled() {
            for message in sessions.history().await? {
                messages.push(ChatMessage::new(message.role, message.content));
            }
        }
        messages.push(ChatMessage::new("user", prompt));

        let temperature =
            effective_temperature(self.llm.temperature, &sessions.overrides().await?);
        let request = ChatRequest {
            model: self.llm.model.clone(),
            messages,
            temperature,
            max_tokens: self.llm.max_tokens,
            stream: self.llm.stream,
        };

        let mut stream = self.client.complete(request).await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            sink(&fragment);
            answer.push_str(&fragment);
        }

        sessions.append_exchange(question, &answer).await?;
        Ok(answer)
    }
}

/// Join retrieved chunks for the prompt, or the no-context placeholder.
fn format_chunks(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

fn compose_prompt(template: &str, context: &str, question: &str) -> String {
    template
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Base temperature overlaid by a session's `temperature` override.
fn effective_temperature(base: f64, overrides: &serde_json::Map<String, serde_json::Value>) -> f64 {
    overrides
        .get("temperature")
        .and_then(|v| v.as_f64())
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AnswerStream, LlmError};
    use async_trait::async_trait;
    use codeask_embed::EmbeddingProvider;
    use codeask_retriever::storage::{ChunkRecord, VectorStore};
    use codeask_retriever::testing::HashProvider;
    use codeask_retriever::{ContextManager, SqliteStore};
    use futures::stream;
    use std::sync::Mutex;

    /// Scripted client: records every request, replays a fixed fragment
    /// sequence (each entry Ok or Err).
    struct ScriptedClient {
        fragments: Vec<Result<String, String>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn answering(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_midstream() -> Self {
            Self {
                fragments: vec![Ok("partial ".to_string()), Err("connection reset".to_string())],
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn complete(&self, request: ChatRequest) -> Result<AnswerStream, LlmError> {
            self.requests.lock().unwrap().push(request);
            let items: Vec<Result<String, LlmError>> = self
                .fragments
                .iter()
                .map(|f| f.clone().map_err(LlmError::Parse))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    async fn fixture(
        client: Arc<ScriptedClient>,
        indexed: &[(&str, &str)],
    ) -> anyhow::Result<(AnswerOrchestrator, ContextManager)> {
        let provider = Arc::new(HashProvider::new(16));
        let store = Arc::new(SqliteStore::open_memory().await?);
        for (path, text) in indexed {
            let embedding = provider.embed_text(text).await?;
            store
                .upsert_file_chunks(
                    path,
                    &[ChunkRecord {
                        chunk_id: format!("{path}:0"),
                        file_path: path.to_string(),
                        sequence: 0,
                        line_start: 0,
                        line_end: 1,
                        content: text.to_string(),
                        content_hash: "hash".to_string(),
                        embedding,
                    }],
                )
                .await?;
        }

        let sessions = ContextManager::new(store.pool().clone(), 10).await?;
        let retriever = Retriever::new(store, provider, 2);
        let orchestrator = AnswerOrchestrator::new(retriever, client, LlmConfig::default());
        Ok((orchestrator, sessions))
    }

    #[test]
    fn test_prompt_template_substitution() {
        let prompt = compose_prompt(
            "Context:\n{context}\n\nQuestion: {question}",
            "chunk one\n---\nchunk two",
            "how does it work?",
        );
        assert!(prompt.contains("chunk one\n---\nchunk two"));
        assert!(prompt.ends_with("Question: how does it work?"));
    }

    #[test]
    fn test_override_overlays_base_temperature() {
        let mut overrides = serde_json::Map::new();
        assert_eq!(effective_temperature(0.7, &overrides), 0.7);

        overrides.insert("temperature".to_string(), serde_json::json!(0.1));
        assert_eq!(effective_temperature(0.7, &overrides), 0.1);

        // Non-numeric override is ignored rather than trusted.
        overrides.insert("temperature".to_string(), serde_json::json!("hot"));
        assert_eq!(effective_temperature(0.7, &overrides), 0.7);
    }

    #[tokio::test]
    async fn test_answer_streams_and_appends_on_success() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::answering(&["It ", "works."]));
        let (orchestrator, sessions) =
            fixture(client.clone(), &[("main.rs", "fn main() {}")]).await?;

        let mut streamed = String::new();
        let answer = orchestrator
            .answer(&sessions, "what is main?", |f| streamed.push_str(f))
            .await?;

        assert_eq!(answer, "It works.");
        assert_eq!(streamed, "It works.");

        let history = sessions.history().await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "what is main?");
        assert_eq!(history[1].content, "It works.");

        // The composed prompt carried the retrieved chunk.
        let request = client.last_request();
        assert!(request.messages.last().unwrap().content.contains("fn main() {}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_midstream_failure_leaves_history_untouched() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::failing_midstream());
        let (orchestrator, sessions) = fixture(client, &[("main.rs", "fn main() {}")]).await?;

        let result = orchestrator.answer(&sessions, "question", |_| {}).await;
        assert!(result.is_err());
        assert!(sessions.history().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_corpus_uses_placeholder() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::answering(&["no idea"]));
        let (orchestrator, sessions) = fixture(client.clone(), &[]).await?;

        orchestrator.answer(&sessions, "anything?", |_| {}).await?;
        let request = client.last_request();
        assert!(request.messages.last().unwrap().content.contains("No context found."));
        Ok(())
    }

    #[tokio::test]
    async fn test_history_omitted_when_context_disabled() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::answering(&["answer"]));
        let (orchestrator, mut sessions) = fixture(client.clone(), &[]).await?;

        sessions.append_exchange("earlier question", "earlier answer").await?;
        sessions.set_context_enabled(false);

        orchestrator.answer(&sessions, "new question", |_| {}).await?;

        let request = client.last_request();
        // system + composed user prompt only, no history in between.
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");

        // The stored history survived the disabled exchange.
        sessions.set_context_enabled(true);
        assert_eq!(sessions.history().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_session_override_sets_request_temperature() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::answering(&["answer"]));
        let (orchestrator, sessions) = fixture(client.clone(), &[]).await?;

        sessions
            .set_runtime_override("temperature", serde_json::json!(0.05))
            .await?;
        orchestrator.answer(&sessions, "q", |_| {}).await?;

        assert_eq!(client.last_request().temperature, 0.05);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_is_sent_in_order() -> anyhow::Result<()> {
        let client = Arc::new(ScriptedClient::answering(&["second answer"]));
        let (orchestrator, sessions) = fixture(client.clone(), &[]).await?;

        sessions.append_exchange("first question", "first answer").await?;
        orchestrator.answer(&sessions, "second question", |_| {}).await?;

        let request = client.last_request();
        assert_eq!(request.messages.len(), 4); // system, user, assistant, composed user
        assert_eq!(request.messages[1].content, "first question");
        assert_eq!(request.messages[2].role, "assistant");
        assert!(request.messages[3].content.contains("second question"));
        Ok(())
    }
}
