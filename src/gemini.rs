//! Gemini REST backend for both text and image generation.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::{GenerationError, Result};
use crate::images::ImageBackend;
use crate::text::TextBackend;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// First few characters of a credential, enough to tell keys apart in logs.
pub fn redact_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}***")
}

pub struct GeminiClient {
    // Built lazily and dropped by `close`, so one client can outlive a close/reopen cycle.
    client: Mutex<Option<Client>>,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &redact_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(None),
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.gemini_api_key.clone())
            .with_base_url(settings.gemini_api_base.clone())
            .with_models(settings.text_model.clone(), settings.image_model.clone())
            .with_timeout(settings.http_timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, text_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn http(&self) -> Result<Client> {
        let mut guard = self.client.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {e}")))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.client.lock().is_some()
    }

    async fn perform_api_call(&self, model: &str, request_body: &Value) -> Result<Value> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);
        let loggable_url = if self.api_key.is_empty() { url.clone() } else { url.replace(&self.api_key, "***") };
        debug!("🔗 Making request to: {}", loggable_url);

        let response = self
            .http()?
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        debug!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(%status, model, "❌ Gemini API error response: {}", error_body);
            return Err(GenerationError::Transport(format!("status={} body={}", status, error_body)));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Transport(format!("unreadable response body: {e}")))?;

        let mut loggable = parsed.clone();
        truncate_base64_in_json(&mut loggable);
        debug!("📥 Raw Gemini API response: {}", loggable);

        Ok(parsed)
    }
}

#[async_trait]
impl TextBackend for GeminiClient {
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let payload = json!({
            "systemInstruction": {
                "parts": [{"text": system_prompt}]
            },
            "contents": [{
                "role": "user",
                "parts": [{"text": user_prompt}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.8,
                "topP": 0.95
            }
        });

        let raw = self.perform_api_call(&self.text_model, &payload).await?;
        let parsed: GeminiResponse = serde_json::from_value(raw)
            .map_err(|e| GenerationError::MalformedResponse(format!("unexpected reply envelope: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(text.as_str()),
                        Part::Other(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::MalformedResponse("no text content found in response".into()));
        }
        info!(model = %self.text_model, chars = text.len(), "✅ Text generated");
        Ok(text)
    }

    async fn close(&self) {
        self.client.lock().take();
    }
}

#[async_trait]
impl ImageBackend for GeminiClient {
    async fn generate_content(&self, prompt: &str) -> Result<Value> {
        let request_body = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });
        info!(model = %self.image_model, "Generating image with Gemini API...");
        self.perform_api_call(&self.image_model, &request_body).await
    }

    async fn close(&self) {
        if self.client.lock().take().is_some() {
            info!("Closed Gemini HTTP client");
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(Value),
}
