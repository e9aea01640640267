//! Answer orchestrator: context + question → answer with citations.
//!
//! Builds a grounded prompt (instruction, citation-tagged context segments
//! in order, question) and calls the configured generation endpoint. With no
//! endpoint configured the orchestrator degrades instead of failing: the
//! retrieved context is returned as a [`DegradedResponse`] so retrieval work
//! is never thrown away.
//!
//! Endpoint failures surface as [`Error::Generation`] tagged transient
//! (timeout, connect, 429, 5xx) or terminal (other 4xx). The orchestrator
//! never retries on its own; that policy belongs to the caller.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::{Error, GenerationErrorKind, Result};
use crate::models::{Answer, AnswerOutcome, Context, DegradedResponse};

const SYSTEM_PROMPT: &str = "You are a concise assistant.";

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct Orchestrator {
    client: Option<Box<dyn GenerationClient>>,
}

impl Orchestrator {
    /// `client: None` means no endpoint is configured; `answer` then runs
    /// in degraded (retrieval-only) mode.
    pub fn new(client: Option<Box<dyn GenerationClient>>) -> Self {
        Self { client }
    }

    /// Build the orchestrator from configuration, wiring the HTTP client
    /// when an endpoint is present.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let client: Option<Box<dyn GenerationClient>> = match &config.endpoint_url {
            Some(_) => Some(Box::new(HttpGenerationClient::new(config)?)),
            None => None,
        };
        Ok(Self::new(client))
    }

    pub async fn answer(&self, question: &str, context: Context) -> Result<AnswerOutcome> {
        let Some(client) = &self.client else {
            return Ok(AnswerOutcome::Degraded(DegradedResponse {
                explanation: "No generation endpoint is configured; showing the retrieved \
                              context instead of a synthesized answer. Set \
                              generation.endpoint_url to enable answers."
                    .to_string(),
                context,
            }));
        };

        let prompt = build_prompt(question, &context);
        let text = client.complete(&prompt).await?;

        Ok(AnswerOutcome::Answered(Answer {
            text,
            citations: context.citations(),
        }))
    }
}

/// Assemble the grounded prompt: numbered context segments, then the question.
pub fn build_prompt(question: &str, context: &Context) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant. Use ONLY the provided context to answer the question. \
         If the answer is not in the context, say you don't know.\n\nContext:\n",
    );

    for (i, segment) in context.segments.iter().enumerate() {
        let _ = write!(
            prompt,
            "[{}] Source: {}\n{}\n\n",
            i + 1,
            segment.citation,
            segment.hit.chunk.text
        );
    }

    let _ = write!(
        prompt,
        "Question: {}\n\nAnswer in a short response and include citations like [1].",
        question
    );
    prompt
}

/// Generation client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    endpoint_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let endpoint_url = config
            .endpoint_url
            .clone()
            .ok_or_else(|| Error::Configuration("generation.endpoint_url is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.2,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::Generation {
            kind: GenerationErrorKind::Transient,
            message: if e.is_timeout() {
                format!("generation endpoint timed out: {}", e)
            } else {
                format!("generation endpoint unreachable: {}", e)
            },
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                kind: classify_status(status),
                message: format!("generation endpoint error {}: {}", status, body_text),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Generation {
            kind: GenerationErrorKind::Transient,
            message: format!("generation response body unreadable: {}", e),
        })?;
        parse_completion_body(&body)
    }
}

/// Parse a successful response body into the completion text. Any failure
/// here is terminal: the endpoint answered, but not in a usable shape.
fn parse_completion_body(body: &[u8]) -> Result<String> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::Generation {
            kind: GenerationErrorKind::Terminal,
            message: format!("generation response was not valid JSON: {}", e),
        })?;
    extract_completion(&json)
}

/// Rate limits and server errors are worth retrying; other client errors
/// (bad request, auth) are not.
fn classify_status(status: reqwest::StatusCode) -> GenerationErrorKind {
    if status.as_u16() == 429 || status.is_server_error() {
        GenerationErrorKind::Transient
    } else {
        GenerationErrorKind::Terminal
    }
}

fn extract_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::Generation {
            kind: GenerationErrorKind::Terminal,
            message: "generation response carried no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{Chunk, ContextSegment, RetrievalHit};

    fn context_with(texts: &[(&str, &str)]) -> Context {
        let mut context = Context::default();
        for (i, (citation, text)) in texts.iter().enumerate() {
            context.total_chars += text.chars().count();
            context.segments.push(ContextSegment {
                citation: citation.to_string(),
                hit: RetrievalHit {
                    chunk: Chunk {
                        chunk_id: format!("d{}:0", i),
                        document_id: format!("d{}", i),
                        chunk_index: 0,
                        offset: 0,
                        text: text.to_string(),
                        metadata: BTreeMap::new(),
                    },
                    score: 1.0,
                    rank: i,
                },
            });
        }
        context
    }

    struct CannedClient(String);

    #[async_trait]
    impl GenerationClient for CannedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl GenerationClient for FailingClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::Generation {
                kind: GenerationErrorKind::Terminal,
                message: "bad request".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_degraded_mode_returns_context_not_error() {
        let orchestrator = Orchestrator::new(None);
        let context = context_with(&[("notes/a.md", "alpha"), ("notes/b.md", "beta")]);

        let outcome = orchestrator.answer("what is alpha?", context).await.unwrap();
        match outcome {
            AnswerOutcome::Degraded(degraded) => {
                assert_eq!(degraded.context.citations(), vec!["notes/a.md", "notes/b.md"]);
                assert!(degraded.explanation.contains("No generation endpoint"));
            }
            AnswerOutcome::Answered(_) => panic!("expected degraded outcome"),
        }
    }

    #[tokio::test]
    async fn test_answer_carries_included_citations_only() {
        let orchestrator = Orchestrator::new(Some(Box::new(CannedClient("42 [1]".into()))));
        let context = context_with(&[("notes/a.md", "the answer is 42")]);

        let outcome = orchestrator.answer("what is the answer?", context).await.unwrap();
        match outcome {
            AnswerOutcome::Answered(answer) => {
                assert_eq!(answer.text, "42 [1]");
                assert_eq!(answer.citations, vec!["notes/a.md"]);
            }
            AnswerOutcome::Degraded(_) => panic!("expected an answer"),
        }
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        let orchestrator = Orchestrator::new(Some(Box::new(FailingClient)));
        let context = context_with(&[("a", "text")]);

        let err = orchestrator.answer("q", context).await.unwrap_err();
        match err {
            Error::Generation { kind, .. } => assert_eq!(kind, GenerationErrorKind::Terminal),
            other => panic!("expected Generation, got {:?}", other),
        }
        assert!(!Error::Generation {
            kind: GenerationErrorKind::Terminal,
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_prompt_tags_segments_in_order() {
        let context = context_with(&[("src/a.rs", "fn a() {}"), ("src/b.rs", "fn b() {}")]);
        let prompt = build_prompt("what does a do?", &context);

        let first = prompt.find("[1] Source: src/a.rs").unwrap();
        let second = prompt.find("[2] Source: src/b.rs").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Question: what does a do?"));
        assert!(prompt.contains("fn a() {}"));
    }

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            GenerationErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            GenerationErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            GenerationErrorKind::Terminal
        );
    }

    #[test]
    fn test_extract_completion() {
        let json = serde_json::json!({
            "choices": [ { "message": { "content": "  hello  " } } ]
        });
        assert_eq!(extract_completion(&json).unwrap(), "hello");
        assert!(extract_completion(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_invalid_json_body_is_terminal_generation_error() {
        let err = parse_completion_body(b"<html>gateway smoked</html>").unwrap_err();
        match err {
            Error::Generation { kind, message } => {
                assert_eq!(kind, GenerationErrorKind::Terminal);
                assert!(message.contains("not valid JSON"));
            }
            other => panic!("expected Generation, got {:?}", other),
        }

        let ok = parse_completion_body(
            br#"{"choices":[{"message":{"content":"fine"}}]}"#,
        )
        .unwrap();
        assert_eq!(ok, "fine");
    }
}
