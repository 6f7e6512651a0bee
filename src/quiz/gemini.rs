//! Google Gemini backend for quiz generation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generator::{GenerationRequest, QuizBackend, UpstreamError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: &str) -> Result<Self, reqwest::Error> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, model: &str, base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );
        Ok(Self {
            client,
            api_key,
            endpoint,
        })
    }
}

#[async_trait]
impl QuizBackend for GeminiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let body = GeminiRequest::from_generation(request);

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Fatal(format!("request to Gemini failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Fatal(format!("unreadable Gemini response: {e}")))?;
        parsed.into_text()
    }
}

/// Maps a non-success reply onto the retry classes the generator understands.
fn classify_failure(status: StatusCode, body: &str) -> UpstreamError {
    let api_status = serde_json::from_str::<GeminiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.status)
        .unwrap_or_default();

    let message = format!("{} {}: {}", status.as_u16(), api_status, body.trim());
    if status == StatusCode::SERVICE_UNAVAILABLE || api_status == "UNAVAILABLE" {
        UpstreamError::Overloaded(message)
    } else {
        UpstreamError::Fatal(message)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

impl<'a> GeminiRequest<'a> {
    fn from_generation(request: &'a GenerationRequest) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    fn into_text(self) -> Result<String, UpstreamError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(UpstreamError::Fatal("Gemini returned no candidate text".into()));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    status: String,
}
