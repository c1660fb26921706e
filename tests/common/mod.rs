#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;
use recipe_studio::error::{GenerationError, Result};
use recipe_studio::images::{ImageBackend, ImageGenerator};
use recipe_studio::models::Persona;
use recipe_studio::pipeline::RecipePipeline;
use recipe_studio::retry::RetryPolicy;
use recipe_studio::text::{TextBackend, TextGenerator};
use serde_json::{json, Value};

/// Answers by prompt kind: suggestion, variant or recipe.
pub struct FakeText {
    pub suggestions: Vec<String>,
    pub recipe_reply: String,
    pub variant_reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeText {
    pub fn new(suggestions: &[&str], steps: usize) -> Self {
        Self {
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            recipe_reply: recipe_json("Kimchi Stew", steps),
            variant_reply: variant_json("Vegan Kimchi Stew"),
            prompts: Mutex::default(),
        }
    }

    pub fn with_recipe_reply(mut self, reply: &str) -> Self {
        self.recipe_reply = reply.to_string();
        self
    }
}

#[async_trait]
impl TextBackend for FakeText {
    async fn complete_json(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().push(user_prompt.to_string());
        if user_prompt.starts_with("Suggest ") {
            Ok(json!({ "dishes": self.suggestions }).to_string())
        } else if user_prompt.starts_with("Create a variation") {
            Ok(self.variant_reply.clone())
        } else {
            Ok(self.recipe_reply.clone())
        }
    }
}

/// Returns a small PNG for every prompt, except prompts containing `fail_on`,
/// which get a reply with no image in it.
pub struct FakeImages {
    pub fail_on: Option<String>,
    pub prompts: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl FakeImages {
    pub fn new() -> Self {
        Self { fail_on: None, prompts: Mutex::default(), closed: Mutex::new(false) }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self { fail_on: Some(marker.to_string()), ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl ImageBackend for FakeImages {
    async fn generate_content(&self, prompt: &str) -> Result<Value> {
        self.prompts.lock().push(prompt.to_string());
        if self.fail_on.as_deref().is_some_and(|marker| prompt.contains(marker)) {
            return Ok(json!({ "candidates": [{ "finishReason": "SAFETY" }] }));
        }
        Ok(json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": BASE64.encode(png(64, 48)) } }] }
            }]
        }))
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([180, 90, 30])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).expect("encode png");
    buf
}

pub fn recipe_json(title: &str, steps: usize) -> String {
    json!({
        "title": title,
        "description": "A warming stew for cold evenings.",
        "ingredients": [
            { "name": "kimchi", "amount": "300g" },
            { "name": "pork belly", "amount": "200g" }
        ],
        "steps": (1..=steps).map(|i| json!({ "order": i, "description": format!("Step number {i}.") })).collect::<Vec<_>>(),
        "hashtags": ["stew"]
    })
    .to_string()
}

pub fn variant_json(title: &str) -> String {
    json!({
        "title": title,
        "description": "The same stew without meat.",
        "ingredients": [
            { "name": "kimchi", "amount": "300g" },
            { "name": "shiitake", "amount": "150g" }
        ],
        "steps": [
            { "order": 1, "description": "Fry the kimchi." },
            { "order": 2, "description": "Add mushrooms and simmer." }
        ],
        "hashtags": ["vegan"],
        "changeDiff": "pork belly -> shiitake",
        "changeReason": "plant-based",
        "changeCategories": ["protein"]
    })
    .to_string()
}

pub fn persona() -> Persona {
    Persona {
        name: "chef_test".into(),
        display_name: "Chef Test".into(),
        locale: "en-US".into(),
        kitchen_style_prompt: "Rustic wooden table, earthenware bowls.".into(),
        specialties: vec!["stews".into()],
        tone: None,
        user_public_id: None,
        persona_public_id: None,
    }
}

pub type FakePipeline = RecipePipeline<Arc<FakeText>, Arc<FakeImages>>;

pub fn pipeline(text: Arc<FakeText>, images: Arc<FakeImages>) -> FakePipeline {
    RecipePipeline::new(
        TextGenerator::new(text).with_retry_policy(RetryPolicy::immediate(3)),
        ImageGenerator::new(images).with_retry_policy(RetryPolicy::immediate(2)),
    )
}

pub fn is_fatal_with(err: &GenerationError, stage: &str) -> bool {
    matches!(err, GenerationError::Fatal { stage: s, .. } if *s == stage)
}
