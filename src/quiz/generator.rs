use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use thiserror::Error;

use crate::quiz::{GenerationError, QuizItem};

/// How many answer options the model is asked for.
pub const OPTION_COUNT: usize = 3;
/// Upper bound on upstream calls for one item, the first call included.
pub const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// What gets sent to the generative backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub response_schema: Value,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The service is temporarily unable to answer; worth another try.
    #[error("upstream overloaded: {0}")]
    Overloaded(String),
    #[error("{0}")]
    Fatal(String),
}

/// A text generation service able to answer with schema-constrained JSON.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Returns the raw JSON document produced for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
}

pub struct QuizGenerator {
    backend: Arc<dyn QuizBackend>,
}

impl QuizGenerator {
    pub fn new(backend: Arc<dyn QuizBackend>) -> Self {
        Self { backend }
    }

    /// Produces a fresh, validated quiz item, optionally about `genre`.
    pub async fn generate_item(&self, genre: Option<&str>) -> Result<QuizItem, GenerationError> {
        log::debug!("Generating quiz item (genre: {:?})", genre);
        let request = GenerationRequest {
            prompt: build_prompt(genre),
            response_schema: quiz_item_schema(),
        };

        let raw = self.call_with_backoff(&request).await?;
        let mut item = serde_json::from_str::<QuizItem>(&raw)
            .map_err(|err| {
                log::error!("Could not parse quiz item: {err}; payload: {raw:?}");
                err
            })?
            .normalize_hint();

        if let Err(err) = item.validate() {
            log::error!("Rejecting quiz item: {err}; payload: {raw:?}");
            return Err(err.into());
        }

        // So the correct answer isn't always in the same spot
        item.options.shuffle(&mut rand::thread_rng());
        Ok(item)
    }

    async fn call_with_backoff(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut attempt = 1;
        let mut delay = INITIAL_BACKOFF;
        loop {
            match self.backend.generate(request).await {
                Ok(raw) => return Ok(raw),
                Err(UpstreamError::Overloaded(reason)) => {
                    if attempt >= MAX_ATTEMPTS {
                        log::error!("Upstream overloaded, giving up after {attempt} attempts: {reason}");
                        return Err(GenerationError::Exhausted { attempts: attempt });
                    }
                    log::warn!(
                        "Upstream overloaded (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {:?}: {reason}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    delay *= 2;
                }
                Err(UpstreamError::Fatal(reason)) => {
                    log::error!("Upstream request failed: {reason}");
                    return Err(GenerationError::Upstream(reason));
                }
            }
        }
    }
}

pub fn build_prompt(genre: Option<&str>) -> String {
    let focus = genre
        .map(|g| format!(" focusing on {g} music"))
        .unwrap_or_default();
    format!(
        "Generate a challenging music quiz question{focus} with {OPTION_COUNT} answer options. \
        Include an interesting fact as a hint. Answer with JSON of the form \
        {{\"question\": \"...\", \"options\": [{{\"text\": \"...\", \"is_correct\": true/false}}, ...], \"hint\": \"...\"}}. \
        Exactly one option must be correct and all option texts must be different."
    )
}

/// JSON schema of [`QuizItem`] in the subset understood by the Gemini API.
pub fn quiz_item_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "question": { "type": "STRING" },
            "options": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING" },
                        "is_correct": { "type": "BOOLEAN" }
                    },
                    "required": ["text", "is_correct"]
                }
            },
            "hint": { "type": "STRING", "nullable": true }
        },
        "required": ["question", "options"]
    })
}
