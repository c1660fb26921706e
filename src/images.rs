//! Food photography generation.
//!
//! The image backend's reply is not shaped consistently: the payload can sit in
//! a top-level `parts` list or under `candidates[].content.parts`, and a part
//! may name its payload field `inline_data` or `inlineData`. Each location has
//! its own extractor in [`RESPONSE_EXTRACTORS`]; they are probed in order and
//! the first payload found wins.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{GenerationError, Result};
use crate::models::{GeneratedImage, ImageRequest, ImageSet, ImageStyle, Persona};
use crate::prompts;
use crate::retry::{retry, RetryPolicy};

#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Issues one generation request and returns the reply as-is.
    async fn generate_content(&self, prompt: &str) -> Result<Value>;

    /// Releases pooled connections. Safe to call more than once.
    async fn close(&self) {}
}

#[async_trait]
impl<T: ImageBackend + ?Sized> ImageBackend for Arc<T> {
    async fn generate_content(&self, prompt: &str) -> Result<Value> {
        (**self).generate_content(prompt).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

// --- Response normalization ---

pub type PayloadExtractor = fn(&Value) -> Option<Bytes>;

/// Probed in this order.
pub static RESPONSE_EXTRACTORS: [(&str, PayloadExtractor); 2] = [
    ("parts", from_top_level_parts),
    ("candidates.content.parts", from_candidate_parts),
];

const PART_PAYLOAD_FIELDS: [&str; 2] = ["inline_data", "inlineData"];

fn payload_from_part(part: &Value) -> Option<Bytes> {
    PART_PAYLOAD_FIELDS.iter().find_map(|field| {
        let data = part.get(field)?.get("data")?.as_str()?;
        if data.is_empty() {
            return None;
        }
        BASE64.decode(data).ok().map(Bytes::from)
    })
}

pub fn from_top_level_parts(response: &Value) -> Option<Bytes> {
    response.get("parts")?.as_array()?.iter().find_map(payload_from_part)
}

pub fn from_candidate_parts(response: &Value) -> Option<Bytes> {
    response
        .get("candidates")?
        .as_array()?
        .iter()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
        .find_map(payload_from_part)
}

/// The first payload found, with the name of the location it came from.
pub fn extract_image_payload(response: &Value) -> Option<(&'static str, Bytes)> {
    RESPONSE_EXTRACTORS
        .iter()
        .find_map(|(location, extract)| extract(response).map(|payload| (*location, payload)))
}

/// Short description of a reply that carried no image, for the error message.
fn describe_empty_response(response: &Value) -> String {
    let finish_reason = response
        .pointer("/candidates/0/finishReason")
        .and_then(Value::as_str)
        .unwrap_or("none");
    let text = response
        .pointer("/candidates/0/content/parts/0/text")
        .or_else(|| response.pointer("/parts/0/text"))
        .and_then(Value::as_str)
        .map(|t| t.chars().take(80).collect::<String>())
        .unwrap_or_default();
    if text.is_empty() {
        format!("finish_reason={finish_reason}")
    } else {
        format!("finish_reason={finish_reason} text={text:?}")
    }
}

// --- Post-processing ---

/// Decodes `bytes`, drops any alpha or palette, shrinks to fit `max_size`
/// (aspect ratio kept, never enlarged) and re-encodes as JPEG at `quality`.
pub fn optimize_image(bytes: &[u8], max_size: (u32, u32), quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let (max_width, max_height) = (max_size.0.max(1), max_size.1.max(1));
    let img = if img.width() > max_width || img.height() > max_height {
        img.resize(max_width, max_height, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = img.to_rgb8();

    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
        encoder.encode_image(&rgb)?;
    }
    debug!(
        width = rgb.width(),
        height = rgb.height(),
        input_bytes = bytes.len(),
        output_bytes = output.len(),
        "image optimized"
    );
    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
    /// Image requests in flight at once within one set.
    pub max_concurrency: usize,
    pub realism_details: usize,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 85,
            max_concurrency: 2,
            realism_details: prompts::DEFAULT_REALISM_DETAILS,
        }
    }
}

/// Result of one image request inside a set.
#[derive(Debug)]
pub enum ImageOutcome {
    Generated(GeneratedImage),
    Failed { request: ImageRequest, error: GenerationError },
}

pub struct ImageGenerator<B> {
    backend: B,
    retry_policy: RetryPolicy,
    options: ImageOptions,
}

impl<B: ImageBackend> ImageGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, retry_policy: RetryPolicy::image_default(), options: ImageOptions::default() }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_options(mut self, options: ImageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    /// One image for `prompt`, retrying transport failures and empty replies.
    /// The last error is returned once the attempts run out.
    pub async fn generate_one(&self, prompt: &str) -> Result<Bytes> {
        retry(&self.retry_policy, "generate_image", GenerationError::is_retryable, |attempt| async move {
            let response = self.backend.generate_content(prompt).await?;
            match extract_image_payload(&response) {
                Some((location, payload)) => {
                    debug!(attempt, location, bytes = payload.len(), "🖼️ Extracted image from API response");
                    Ok(payload)
                }
                None => Err(GenerationError::EmptyGenerationResponse(describe_empty_response(&response))),
            }
        })
        .await
    }

    /// Like [`generate_one`](Self::generate_one), optionally with realism
    /// details appended once up front so every retry sends the same prompt.
    pub async fn generate_image(&self, prompt: &str, add_realism: bool) -> Result<Bytes> {
        let prompt = if add_realism {
            let mut rng = rand::thread_rng();
            prompts::with_realism_details(prompt, &mut rng, self.options.realism_details)
        } else {
            prompt.to_string()
        };
        self.generate_one(&prompt).await
    }

    async fn request_image(&self, subject: &str, persona: &Persona, request: ImageRequest) -> ImageOutcome {
        let prompt = prompts::build_image_prompt(subject, persona, request.style, request.angle_index);
        match self.generate_image(&prompt, true).await {
            Ok(data) => ImageOutcome::Generated(GeneratedImage {
                style: request.style,
                angle_index: request.angle_index,
                ordinal: request.ordinal,
                data,
            }),
            Err(error) => ImageOutcome::Failed { request, error },
        }
    }

    /// Cover images (angle index = position) followed by step images. Each
    /// request fails on its own; the set holds whatever succeeded, in request
    /// order, and this never returns an error.
    pub async fn generate_set(&self, subject: &str, persona: &Persona, cover_count: usize, step_count: usize) -> ImageSet {
        let requests: Vec<ImageRequest> = (0..cover_count)
            .map(|i| ImageRequest { style: ImageStyle::Cover, angle_index: i, ordinal: i })
            .chain((0..step_count).map(|i| ImageRequest { style: ImageStyle::Step, angle_index: 0, ordinal: i }))
            .collect();

        // `buffered` yields in submission order regardless of completion order.
        let outcomes: Vec<ImageOutcome> = stream::iter(requests)
            .map(|request| self.request_image(subject, persona, request))
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let set = outcomes.into_iter().fold(ImageSet::default(), |mut set, outcome| {
            match outcome {
                ImageOutcome::Generated(image) => {
                    let (total, list) = match image.style {
                        ImageStyle::Step => (step_count, &mut set.step_images),
                        _ => (cover_count, &mut set.cover_images),
                    };
                    info!(
                        dish = subject,
                        style = image.style.as_str(),
                        index = image.ordinal + 1,
                        total,
                        "✅ Image generated"
                    );
                    list.push(image);
                }
                ImageOutcome::Failed { request, error } => {
                    error!(
                        dish = subject,
                        style = request.style.as_str(),
                        index = request.ordinal + 1,
                        error = %error,
                        "❌ Image generation failed, skipping"
                    );
                }
            }
            set
        });

        info!(
            dish = subject,
            covers = set.cover_images.len(),
            covers_requested = cover_count,
            steps = set.step_images.len(),
            steps_requested = step_count,
            "Image set complete"
        );
        set
    }

    /// A single image in `style` with the canonical angle, or `None` if it could not be generated.
    pub async fn generate_single(&self, subject: &str, persona: &Persona, style: ImageStyle) -> Option<Bytes> {
        let prompt = prompts::build_image_prompt(subject, persona, style, 0);
        match self.generate_image(&prompt, true).await {
            Ok(data) => Some(data),
            Err(e) => {
                error!(dish = subject, style = style.as_str(), error = %e, "❌ Image generation failed");
                None
            }
        }
    }

    pub fn optimize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        optimize_image(bytes, (self.options.max_width, self.options.max_height), self.options.quality)
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }
}
