use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Failure modes of the external text-generation capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AiError {
    #[error("ai request timed out after {0:?}")]
    Timeout(Duration),
    #[error("ai provider rate limited the request (status {status})")]
    RateLimited { status: u16 },
    #[error("ai provider unavailable: {0}")]
    Unavailable(String),
    #[error("ai provider rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("ai response malformed: {0}")]
    Malformed(String),
    #[error("ai provider is not configured")]
    NotConfigured,
}

impl AiError {
    /// Availability failures recover through a deterministic fallback;
    /// content and request failures do not.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AiError::Timeout(_)
                | AiError::RateLimited { .. }
                | AiError::Unavailable(_)
                | AiError::NotConfigured
        )
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, AiError>;
}

/// Runs one generation bounded by `limit`.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    limit: Duration,
) -> Result<String, AiError> {
    match tokio::time::timeout(limit, generator.generate_text(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(limit)),
    }
}

/// Drops markdown code-fence markers models like to wrap JSON in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Google Generative Language API client.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .user_agent("student-performance-ai/0.1")
            .timeout(config.timeout)
            .build()
            .map_err(|err| AiError::Unavailable(format!("http client setup failed: {err}")))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    fn classify_transport(&self, err: reqwest::Error) -> AiError {
        if err.is_timeout() {
            AiError::Timeout(self.config.timeout)
        } else {
            AiError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
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

fn classify_status(status: StatusCode, body: String) -> AiError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        AiError::RateLimited {
            status: status.as_u16(),
        }
    } else if status.is_server_error() {
        AiError::Unavailable(format!("status {}", status.as_u16()))
    } else {
        let mut body = body;
        body.truncate(512);
        AiError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

fn response_text(response: GenerateResponse) -> Result<String, AiError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AiError::Malformed("response carried no text".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, AiError> {
        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await
            .map_err(|err| self.classify_transport(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let payload = response
            .json::<GenerateResponse>()
            .await
            .map_err(|err| AiError::Malformed(err.to_string()))?;
        response_text(payload)
    }
}

/// Stand-in used when no API key is configured; every call reports the
/// provider as unavailable so callers take their fallback path.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate_text(&self, _prompt: &str) -> Result<String, AiError> {
        Err(AiError::NotConfigured)
    }
}

/// Returns the same outcome for every prompt and records what it was asked.
pub struct CannedGenerator {
    outcome: Result<String, AiError>,
    delay: Duration,
    prompts: tokio::sync::Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            delay: Duration::ZERO,
            prompts: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: AiError) -> Self {
        Self {
            outcome: Err(err),
            delay: Duration::ZERO,
            prompts: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String, AiError> {
        self.prompts.lock().await.push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}
