mod common;

use std::sync::Arc;

use common::{is_fatal_with, persona, pipeline, FakeImages, FakeText};
use pretty_assertions::assert_eq;
use recipe_studio::error::GenerationError;
use recipe_studio::models::ImageStyle;

#[tokio::test]
async fn explicit_subject_skips_suggestions() {
    let text = Arc::new(FakeText::new(&["Bibimbap"], 4));
    let images = Arc::new(FakeImages::new());
    let pipeline = pipeline(text.clone(), images.clone());

    let result = pipeline.run(&persona(), Some("  Kimchi Stew "), &[], 2, false).await.unwrap();

    assert_eq!(result.subject, "Kimchi Stew");
    assert_eq!(result.persona, "chef_test");
    assert_eq!(result.document.title, "Kimchi Stew");
    assert_eq!(result.cover_images.len(), 2);
    assert!(result.step_images.is_empty());
    assert!(text.prompts.lock().iter().all(|p| !p.starts_with("Suggest ")));
}

#[tokio::test]
async fn blank_subject_asks_for_a_suggestion() {
    let text = Arc::new(FakeText::new(&["Bibimbap"], 3));
    let pipeline = pipeline(text.clone(), Arc::new(FakeImages::new()));

    let result = pipeline.run(&persona(), Some("   "), &["Kimchi Stew".into()], 1, false).await.unwrap();

    assert_eq!(result.subject, "Bibimbap");
    let prompts = text.prompts.lock();
    assert!(prompts[0].starts_with("Suggest "));
    assert!(prompts[0].contains("Kimchi Stew"));
}

#[tokio::test]
async fn excluded_suggestions_are_fatal() {
    let text = Arc::new(FakeText::new(&["kimchi stew", "BIBIMBAP"], 3));
    let images = Arc::new(FakeImages::new());
    let pipeline = pipeline(text, images.clone());

    let err = pipeline
        .run(&persona(), None, &["Kimchi Stew".into(), "Bibimbap".into()], 1, false)
        .await
        .unwrap_err();

    assert!(is_fatal_with(&err, "subject selection"));
    assert!(matches!(err.root_cause(), GenerationError::NoCandidateSubject(_)));
    assert_eq!(images.calls(), 0);
}

#[tokio::test]
async fn malformed_recipe_text_is_fatal_and_skips_images() {
    let text = Arc::new(FakeText::new(&[], 3).with_recipe_reply(r#"{"description": "no title"}"#));
    let images = Arc::new(FakeImages::new());
    let pipeline = pipeline(text, images.clone());

    let err = pipeline.run(&persona(), Some("Kimchi Stew"), &[], 2, true).await.unwrap_err();

    assert!(is_fatal_with(&err, "text generation"));
    assert!(matches!(err.root_cause(), GenerationError::MalformedResponse(_)));
    assert_eq!(images.calls(), 0);
}

#[tokio::test]
async fn one_step_image_per_document_step() {
    let pipeline = pipeline(Arc::new(FakeText::new(&[], 5)), Arc::new(FakeImages::new()));

    let result = pipeline.run(&persona(), Some("Kimchi Stew"), &[], 1, true).await.unwrap();

    assert_eq!(result.document.steps.len(), 5);
    assert_eq!(result.step_images.len(), 5);
    assert!(result.step_images.iter().all(|img| img.style == ImageStyle::Step));
    assert_eq!(result.step_images.iter().map(|img| img.ordinal).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn failed_cover_is_left_out_in_order() {
    // Angle index 1 is the high-angle cover; every attempt for it comes back empty.
    let images = Arc::new(FakeImages::failing_on("75-degree high angle"));
    let pipeline = pipeline(Arc::new(FakeText::new(&[], 3)), images.clone());

    let result = pipeline.run(&persona(), Some("Kimchi Stew"), &[], 3, false).await.unwrap();

    assert_eq!(result.cover_images.iter().map(|img| img.ordinal).collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(result.cover_images.iter().map(|img| img.angle_index).collect::<Vec<_>>(), vec![0, 2]);
    // Two covers once each, the failing one twice.
    assert_eq!(images.calls(), 4);
}

#[tokio::test]
async fn variant_keeps_subject_and_uses_new_title_for_images() {
    let images = Arc::new(FakeImages::new());
    let pipeline = pipeline(Arc::new(FakeText::new(&[], 3)), images.clone());
    let parent = pipeline.run(&persona(), Some("Kimchi Stew"), &[], 1, false).await.unwrap();

    let variant = pipeline.run_variant(&persona(), &parent, "make it vegan", 2).await.unwrap();

    assert_ne!(variant.id, parent.id);
    assert_eq!(variant.subject, "Kimchi Stew");
    assert_eq!(variant.document.title, "Vegan Kimchi Stew");
    let meta = variant.document.variant.as_ref().unwrap();
    assert_eq!(meta.change_reason, "plant-based");
    assert_eq!(variant.cover_images.len(), 2);
    assert!(variant.step_images.is_empty());
    assert!(images.prompts.lock().iter().skip(1).all(|p| p.contains("Vegan Kimchi Stew")));
}

#[tokio::test]
async fn close_reaches_the_backends() {
    let images = Arc::new(FakeImages::new());
    let pipeline = pipeline(Arc::new(FakeText::new(&[], 3)), images.clone());
    pipeline.close().await;
    pipeline.close().await;
    assert!(*images.closed.lock());
}
