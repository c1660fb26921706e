//! Recipe text generation: documents, subject suggestions and variants.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::error::{GenerationError, Result};
use crate::models::{GeneratedDocument, Ingredient, Persona, Step, VariantMetadata};
use crate::prompts;
use crate::retry::{retry, RetryPolicy};

/// A structured-output text model.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Issues one request and returns the raw reply text, which is expected to be JSON.
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    async fn close(&self) {}
}

#[async_trait]
impl<T: TextBackend + ?Sized> TextBackend for Arc<T> {
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        (**self).complete_json(system_prompt, user_prompt).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

// --- Reply shapes ---

#[derive(Debug, Deserialize)]
struct RawIngredient {
    name: String,
    #[serde(deserialize_with = "lenient_text")]
    amount: String,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(deserialize_with = "lenient_order")]
    order: u32,
    description: String,
}

/// JSON mode still yields `"amount": 2` or `"order": 1.0` now and then.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(text) => text,
        TextOrNumber::Number(n) => n.to_string(),
    })
}

fn lenient_order<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(text) => text.trim().parse::<f64>().ok(),
        TextOrNumber::Number(n) => n.as_f64(),
    };
    value
        .filter(|v| v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(v))
        .map(|v| v as u32)
        .ok_or_else(|| D::Error::custom("step order must be a whole number"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    title: String,
    description: String,
    ingredients: Vec<RawIngredient>,
    steps: Vec<RawStep>,
    #[serde(default)]
    hashtags: Vec<String>,
    #[serde(default)]
    change_diff: Option<String>,
    #[serde(default)]
    change_reason: Option<String>,
    #[serde(default)]
    change_categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSuggestions {
    dishes: Vec<String>,
}

fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| GenerationError::MalformedResponse(format!("{e}")))
}

/// Models occasionally wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

impl RawDocument {
    fn into_document(self, variant: Option<VariantMetadata>) -> GeneratedDocument {
        GeneratedDocument {
            title: self.title,
            description: self.description,
            ingredients: self
                .ingredients
                .into_iter()
                .map(|i| Ingredient { name: i.name, amount: i.amount })
                .collect(),
            steps: self
                .steps
                .into_iter()
                .map(|s| Step { order: s.order, instruction: s.description })
                .collect(),
            hashtags: self.hashtags,
            variant,
        }
    }
}

pub fn parse_document(reply: &str) -> Result<GeneratedDocument> {
    let raw: RawDocument = parse_reply(reply)?;
    Ok(raw.into_document(None))
}

/// Like [`parse_document`] but the change description fields are required.
pub fn parse_variant(reply: &str) -> Result<GeneratedDocument> {
    let mut raw: RawDocument = parse_reply(reply)?;
    let change_diff = raw
        .change_diff
        .take()
        .ok_or_else(|| GenerationError::MalformedResponse("missing field `changeDiff`".into()))?;
    let change_reason = raw
        .change_reason
        .take()
        .ok_or_else(|| GenerationError::MalformedResponse("missing field `changeReason`".into()))?;
    let change_categories = std::mem::take(&mut raw.change_categories);
    Ok(raw.into_document(Some(VariantMetadata { change_diff, change_reason, change_categories })))
}

/// Drops blanks, case-insensitive duplicates and anything in `exclude`, keeping at most `count`.
pub fn filter_subjects(candidates: Vec<String>, exclude: &[String], count: usize) -> Vec<String> {
    let mut seen: HashSet<String> = exclude.iter().map(|s| normalize_subject(s)).collect();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(normalize_subject(c)))
        .take(count)
        .collect()
}

pub fn normalize_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}

pub struct TextGenerator<B> {
    backend: B,
    retry_policy: RetryPolicy,
}

impl<B: TextBackend> TextGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, retry_policy: RetryPolicy::text_default() }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// One backend request. Only transport failures are retried: a reply that
    /// arrived but cannot be used will not improve by asking again.
    async fn request(&self, label: &str, system_prompt: &str, user_prompt: &str) -> Result<String> {
        retry(
            &self.retry_policy,
            label,
            |e| matches!(e, GenerationError::Transport(_)),
            |_| self.backend.complete_json(system_prompt, user_prompt),
        )
        .await
    }

    pub async fn generate_document(&self, persona: &Persona, subject: &str) -> Result<GeneratedDocument> {
        let system_prompt = prompts::build_system_prompt(persona);
        let user_prompt = prompts::build_recipe_prompt(subject);
        let reply = self.request("generate_document", &system_prompt, &user_prompt).await?;
        let document = parse_document(&reply).inspect_err(|e| {
            warn!(persona = %persona.name, subject, error = %e, "recipe reply could not be parsed");
        })?;
        info!(
            persona = %persona.name,
            subject,
            title = %document.title,
            ingredients = document.ingredients.len(),
            steps = document.steps.len(),
            "✅ Recipe text generated"
        );
        Ok(document)
    }

    /// Up to `count` dish names not already in `exclude` (case-insensitive).
    /// The backend is asked to avoid `exclude` too, but that is not relied on.
    pub async fn suggest_subjects(&self, persona: &Persona, count: usize, exclude: &[String]) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let system_prompt = prompts::build_system_prompt(persona);
        let user_prompt = prompts::build_suggestion_prompt(persona, count, exclude);
        let reply = self.request("suggest_subjects", &system_prompt, &user_prompt).await?;
        let raw: RawSuggestions = parse_reply(&reply)?;
        let returned = raw.dishes.len();
        let subjects = filter_subjects(raw.dishes, exclude, count);
        if subjects.len() < returned.min(count) {
            warn!(
                persona = %persona.name,
                returned,
                kept = subjects.len(),
                "backend suggested excluded or duplicate subjects"
            );
        }
        Ok(subjects)
    }

    pub async fn generate_variant(
        &self,
        persona: &Persona,
        parent: &GeneratedDocument,
        variation: &str,
    ) -> Result<GeneratedDocument> {
        let system_prompt = prompts::build_system_prompt(persona);
        let user_prompt = prompts::build_variant_prompt(parent, variation);
        let reply = self.request("generate_variant", &system_prompt, &user_prompt).await?;
        let document = parse_variant(&reply)?;
        info!(
            persona = %persona.name,
            parent = %parent.title,
            title = %document.title,
            variation,
            "✅ Variant text generated"
        );
        Ok(document)
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }
}
