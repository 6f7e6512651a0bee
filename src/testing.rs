//! Test doubles for the generation backend and the key-value store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::quiz::generator::{GenerationRequest, QuizBackend, UpstreamError};
use crate::storage::{KeyValueStore, MemoryStore, StoreError};

/// Backend that replays queued results in order.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, raw: String) {
        self.responses.lock().unwrap().push_back(Ok(raw));
    }

    pub fn push_overloaded(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(UpstreamError::Overloaded("503 UNAVAILABLE".into())));
    }

    pub fn push_fatal(&self, reason: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(UpstreamError::Fatal(reason.into())));
    }

    pub fn clear(&self) {
        self.responses.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl QuizBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Fatal("no scripted response queued".into())))
    }
}

/// JSON the way the model answers, with the correct option first.
pub fn quiz_json(question: &str, correct: &str, wrong: &[&str]) -> String {
    let mut options = vec![json!({ "text": correct, "is_correct": true })];
    options.extend(
        wrong
            .iter()
            .map(|w| json!({ "text": w, "is_correct": false })),
    );
    json!({
        "question": question,
        "options": options,
        "hint": "A fun fact"
    })
    .to_string()
}

/// Store whose backing service is always down.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Wraps a memory store and refuses writes to keys ending in `suffix`.
pub struct ReadOnlyKeys {
    inner: Arc<MemoryStore>,
    suffix: &'static str,
}

impl ReadOnlyKeys {
    pub fn new(inner: Arc<MemoryStore>, suffix: &'static str) -> Self {
        Self { inner, suffix }
    }
}

#[async_trait]
impl KeyValueStore for ReadOnlyKeys {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.ends_with(self.suffix) {
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        self.inner.set(key, value).await
    }
}
