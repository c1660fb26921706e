use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A content-authoring profile. Owned by the persona registry; generation code
/// only reads it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub display_name: String,
    /// BCP-47 style locale, e.g. `ko-KR`. Decides the language all generated text is written in.
    pub locale: String,
    pub kitchen_style_prompt: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
    // Set by the external uploader once the persona has authenticated.
    #[serde(default)]
    pub user_public_id: Option<String>,
    #[serde(default)]
    pub persona_public_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Step {
    pub order: u32,
    pub instruction: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VariantMetadata {
    pub change_diff: String,
    pub change_reason: String,
    pub change_categories: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedDocument {
    pub title: String,
    pub description: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub variant: Option<VariantMetadata>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    /// Finished, plated dish.
    Cover,
    /// Cooking in progress.
    Step,
    /// Casual "user photo" of the dish.
    Log,
}

impl ImageStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStyle::Cover => "cover",
            ImageStyle::Step => "step",
            ImageStyle::Log => "log",
        }
    }
}

/// One image to synthesize. `ordinal` is the position of the request inside its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    pub style: ImageStyle,
    pub angle_index: usize,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub style: ImageStyle,
    pub angle_index: usize,
    pub ordinal: usize,
    pub data: Bytes,
}

/// Successful images only, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSet {
    pub cover_images: Vec<GeneratedImage>,
    pub step_images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub id: Uuid,
    pub persona: String,
    pub subject: String,
    pub document: GeneratedDocument,
    pub cover_images: Vec<GeneratedImage>,
    pub step_images: Vec<GeneratedImage>,
    pub created_at: DateTime<Utc>,
}

// --- HTTP payloads ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRecipeRequest {
    pub persona: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub cover_count: Option<usize>,
    #[serde(default)]
    pub step_images: bool,
    #[serde(default)]
    pub exclude: Vec<String>, // subjects this persona already published
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SuggestSubjectsRequest {
    pub persona: String,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VariantRequest {
    pub variation: String,
    #[serde(default)]
    pub cover_count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageView {
    pub style: ImageStyle,
    pub ordinal: usize,
    pub image_base64: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecipeView {
    pub id: Uuid,
    pub persona: String,
    pub subject: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub document: GeneratedDocument,
    pub cover_images: Vec<ImageView>,
    pub step_images: Vec<ImageView>,
    pub created_at: DateTime<Utc>,
}
