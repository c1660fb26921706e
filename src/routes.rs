use axum::{Json, Router, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post}};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::{collections::HashMap, sync::Arc};
use parking_lot::RwLock;
use uuid::Uuid;
use tracing::{error, warn};

use crate::{
    error::GenerationError,
    images::{optimize_image, ImageBackend, ImageOptions},
    models::{GenerateRecipeRequest, GeneratedImage, GenerationResult, ImageView, Persona, RecipeView, SuggestSubjectsRequest, VariantRequest},
    pdf::generate_pdf,
    personas::PersonaRegistry,
    pipeline::RecipePipeline,
    text::{normalize_subject, TextBackend},
};

pub const MAX_COVER_IMAGES: usize = 6;
const DEFAULT_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS: usize = 20;

pub struct StoredRecipe {
    pub result: GenerationResult,
    pub view: RecipeView,
}

pub struct AppState<T, I> {
    /// Every generated recipe, kept for the life of the process. Nothing is evicted.
    pub store: Arc<RwLock<HashMap<Uuid, StoredRecipe>>>,
    pub pipeline: Arc<RecipePipeline<T, I>>,
    pub personas: Arc<PersonaRegistry>,
    pub default_cover_count: usize,
}

impl<T, I> Clone for AppState<T, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            pipeline: self.pipeline.clone(),
            personas: self.personas.clone(),
            default_cover_count: self.default_cover_count,
        }
    }
}

impl<T, I> AppState<T, I> {
    pub fn new(pipeline: RecipePipeline<T, I>, personas: PersonaRegistry, default_cover_count: usize) -> Self {
        Self {
            store: Arc::default(),
            pipeline: Arc::new(pipeline),
            personas: Arc::new(personas),
            default_cover_count,
        }
    }
}

pub fn router<T, I>(state: AppState<T, I>) -> Router
where
    T: TextBackend + 'static,
    I: ImageBackend + 'static,
{
    Router::new()
        .route("/api/personas", get(list_personas::<T, I>))
        .route("/api/subjects", post(suggest_subjects::<T, I>))
        .route("/api/recipes", post(generate_recipe::<T, I>))
        .route("/api/recipes/:id", get(get_recipe::<T, I>))
        .route("/api/recipes/:id/variants", post(create_variant::<T, I>))
        .route("/api/recipes/:id/pdf", get(export_pdf::<T, I>))
        .with_state(state)
}

impl IntoResponse for GenerationError {
    fn into_response(self) -> Response {
        let status = match self.root_cause() {
            GenerationError::NoCandidateSubject(_) => StatusCode::CONFLICT,
            GenerationError::Persona(_) => StatusCode::NOT_FOUND,
            GenerationError::Transport(_)
            | GenerationError::EmptyGenerationResponse(_)
            | GenerationError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("❌ Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Re-encodes images for delivery off the async workers. Images that fail to
/// decode are dropped, like images that failed to generate.
async fn deliverable_images(images: Vec<GeneratedImage>, options: ImageOptions) -> Vec<ImageView> {
    let joined = tokio::task::spawn_blocking(move || {
        images
            .iter()
            .filter_map(|img| match optimize_image(&img.data, (options.max_width, options.max_height), options.quality) {
                Ok(jpeg) => Some(ImageView { style: img.style, ordinal: img.ordinal, image_base64: BASE64.encode(jpeg) }),
                Err(e) => {
                    warn!(style = img.style.as_str(), ordinal = img.ordinal, error = %e, "dropping image that could not be optimized");
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await;
    joined.unwrap_or_else(|e| {
        error!("❌ Image optimization task failed: {}", e);
        Vec::new()
    })
}

async fn store_result<T, I>(state: &AppState<T, I>, result: GenerationResult, parent_id: Option<Uuid>) -> RecipeView
where
    T: TextBackend,
    I: ImageBackend,
{
    let options = *state.pipeline.images().options();
    let cover_images = deliverable_images(result.cover_images.clone(), options).await;
    let step_images = deliverable_images(result.step_images.clone(), options).await;
    let view = RecipeView {
        id: result.id,
        persona: result.persona.clone(),
        subject: result.subject.clone(),
        parent_id,
        document: result.document.clone(),
        cover_images,
        step_images,
        created_at: result.created_at,
    };
    state.store.write().insert(result.id, StoredRecipe { result, view: view.clone() });
    view
}

pub async fn list_personas<T, I>(State(state): State<AppState<T, I>>) -> Result<Json<Vec<Persona>>, GenerationError> {
    Ok(Json(state.personas.all()?))
}

pub async fn suggest_subjects<T, I>(
    State(state): State<AppState<T, I>>,
    Json(body): Json<SuggestSubjectsRequest>,
) -> Result<Json<Vec<String>>, GenerationError>
where
    T: TextBackend,
    I: ImageBackend,
{
    let persona = state.personas.get(&body.persona)?;
    let count = body.count.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS);
    let subjects = state.pipeline.text().suggest_subjects(&persona, count, &body.exclude).await?;
    Ok(Json(subjects))
}

pub async fn generate_recipe<T, I>(
    State(state): State<AppState<T, I>>,
    Json(body): Json<GenerateRecipeRequest>,
) -> Result<Json<RecipeView>, GenerationError>
where
    T: TextBackend,
    I: ImageBackend,
{
    let persona = state.personas.get(&body.persona)?;
    let cover_count = body.cover_count.unwrap_or(state.default_cover_count).min(MAX_COVER_IMAGES);

    // Subjects this persona already has in the store count as existing too.
    let mut existing = body.exclude.clone();
    {
        let store = state.store.read();
        existing.extend(
            store
                .values()
                .filter(|r| r.result.persona == persona.name)
                .map(|r| r.result.subject.clone()),
        );
    }
    existing.sort_by_key(|s| normalize_subject(s));
    existing.dedup_by_key(|s| normalize_subject(s));

    tracing::info!("🚀 Generating recipe for persona: {}", persona.name);
    let result = state
        .pipeline
        .run(&persona, body.subject.as_deref(), &existing, cover_count, body.step_images)
        .await?;

    Ok(Json(store_result(&state, result, None).await))
}

pub async fn get_recipe<T, I>(Path(id): Path<Uuid>, State(state): State<AppState<T, I>>) -> Response {
    if let Some(r) = state.store.read().get(&id) { Json(r.view.clone()).into_response() } else { StatusCode::NOT_FOUND.into_response() }
}

pub async fn create_variant<T, I>(
    Path(id): Path<Uuid>,
    State(state): State<AppState<T, I>>,
    Json(body): Json<VariantRequest>,
) -> Result<Json<RecipeView>, Response>
where
    T: TextBackend,
    I: ImageBackend,
{
    let parent = {
        let guard = state.store.read();
        guard.get(&id).map(|r| r.result.clone()).ok_or_else(|| StatusCode::NOT_FOUND.into_response())?
    };
    let variation = body.variation.trim();
    if variation.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "variation must not be empty").into_response());
    }
    let persona = state.personas.get(&parent.persona).map_err(IntoResponse::into_response)?;
    let cover_count = body.cover_count.unwrap_or(state.default_cover_count).min(MAX_COVER_IMAGES);

    let result = state
        .pipeline
        .run_variant(&persona, &parent, variation, cover_count)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(store_result(&state, result, Some(id)).await))
}

pub async fn export_pdf<T, I>(Path(id): Path<Uuid>, State(state): State<AppState<T, I>>) -> Response {
    let recipe = state.store.read().get(&id).map(|r| r.result.clone());
    let Some(recipe) = recipe else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match generate_pdf(&recipe) {
        Ok(pdf_bytes) => {
            let mut headers = axum::http::HeaderMap::new();
            headers.insert(axum::http::header::CONTENT_TYPE, axum::http::HeaderValue::from_static("application/pdf"));
            if let Ok(value) = format!("attachment; filename=\"recipe_{}.pdf\"", id).parse() {
                headers.insert(axum::http::header::CONTENT_DISPOSITION, value);
            }
            (StatusCode::OK, headers, pdf_bytes).into_response()
        }
        Err(e) => e.into_response(),
    }
}
