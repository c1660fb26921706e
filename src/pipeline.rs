//! End-to-end recipe generation: subject choice, recipe text, then images.
//!
//! Subject selection and text generation are fatal when they fail; image
//! failures only shorten the image lists.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{GenerationError, Result};
use crate::images::{ImageBackend, ImageGenerator};
use crate::models::{GenerationResult, Persona};
use crate::text::{filter_subjects, TextBackend, TextGenerator};

pub struct RecipePipeline<T, I> {
    text: TextGenerator<T>,
    images: ImageGenerator<I>,
}

impl<T: TextBackend, I: ImageBackend> RecipePipeline<T, I> {
    pub fn new(text: TextGenerator<T>, images: ImageGenerator<I>) -> Self {
        Self { text, images }
    }

    pub fn text(&self) -> &TextGenerator<T> {
        &self.text
    }

    pub fn images(&self) -> &ImageGenerator<I> {
        &self.images
    }

    /// Uses `subject` when given, otherwise asks the text backend for one that
    /// is not in `existing_subjects`. The backend's answer is filtered again
    /// here because it does not reliably honour the exclusion list.
    pub async fn choose_subject(&self, persona: &Persona, subject: Option<&str>, existing_subjects: &[String]) -> Result<String> {
        if let Some(subject) = subject.map(str::trim).filter(|s| !s.is_empty()) {
            info!(persona = %persona.name, subject, "Using specified subject");
            return Ok(subject.to_string());
        }

        let suggestions = self.text.suggest_subjects(persona, 1, existing_subjects).await?;
        if suggestions.is_empty() {
            return Err(GenerationError::NoCandidateSubject(format!(
                "no new subject suggested for {} ({} excluded)",
                persona.name,
                existing_subjects.len()
            )));
        }
        filter_subjects(suggestions, existing_subjects, 1)
            .into_iter()
            .next()
            .inspect(|chosen| info!(persona = %persona.name, subject = %chosen, "AI chose subject"))
            .ok_or_else(|| GenerationError::NoCandidateSubject("all suggested subjects already exist".into()))
    }

    #[instrument(skip_all, fields(persona = %persona.name, cover_count = cover_count, step_images = generate_step_images))]
    pub async fn run(
        &self,
        persona: &Persona,
        subject: Option<&str>,
        existing_subjects: &[String],
        cover_count: usize,
        generate_step_images: bool,
    ) -> Result<GenerationResult> {
        let subject = self
            .choose_subject(persona, subject, existing_subjects)
            .await
            .map_err(|e| GenerationError::fatal("subject selection", e))?;

        let document = self
            .text
            .generate_document(persona, &subject)
            .await
            .map_err(|e| GenerationError::fatal("text generation", e))?;

        let step_count = if generate_step_images { document.steps.len() } else { 0 };
        let images = self.images.generate_set(&subject, persona, cover_count, step_count).await;

        info!(
            subject = %subject,
            title = %document.title,
            covers = images.cover_images.len(),
            step_images = images.step_images.len(),
            "✅ Recipe generated"
        );

        Ok(GenerationResult {
            id: Uuid::new_v4(),
            persona: persona.name.clone(),
            subject,
            document,
            cover_images: images.cover_images,
            step_images: images.step_images,
            created_at: Utc::now(),
        })
    }

    /// A variation of `parent` with fresh cover images for the new dish.
    #[instrument(skip_all, fields(persona = %persona.name, parent = %parent.id, variation = variation))]
    pub async fn run_variant(
        &self,
        persona: &Persona,
        parent: &GenerationResult,
        variation: &str,
        cover_count: usize,
    ) -> Result<GenerationResult> {
        let document = self
            .text
            .generate_variant(persona, &parent.document, variation)
            .await
            .map_err(|e| GenerationError::fatal("variant generation", e))?;

        let images = self.images.generate_set(&document.title, persona, cover_count, 0).await;

        Ok(GenerationResult {
            id: Uuid::new_v4(),
            persona: persona.name.clone(),
            subject: parent.subject.clone(),
            document,
            cover_images: images.cover_images,
            step_images: images.step_images,
            created_at: Utc::now(),
        })
    }

    pub async fn close(&self) {
        self.text.close().await;
        self.images.close().await;
    }
}
