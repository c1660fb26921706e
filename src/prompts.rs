//! Prompt construction for the text and image backends.
//!
//! Everything in here is pure: the same inputs give the same prompt, except
//! for [`with_realism_details`], which draws from the RNG it is handed.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{GeneratedDocument, ImageStyle, Persona};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverAngle {
    pub name: &'static str,
    pub angle_desc: &'static str,
    pub composition: &'static str,
}

/// Camera angles cycled through for cover images. Index 0 is the canonical
/// overhead shot and is also used for step and log images.
pub static COVER_CAMERA_ANGLES: [CoverAngle; 4] = [
    CoverAngle {
        name: "overhead",
        angle_desc: "Shot from directly above the table",
        composition: "Bird's eye view flat lay composition, the whole dish visible and centered",
    },
    CoverAngle {
        name: "high_angle",
        angle_desc: "Shot from a 75-degree high angle",
        composition: "High angle view showing both the surface and the depth of the dish",
    },
    CoverAngle {
        name: "eye_level",
        angle_desc: "Shot at table level from the side",
        composition: "Side view emphasising height, layers and texture of the dish",
    },
    CoverAngle {
        name: "close_up",
        angle_desc: "Close-up shot at a 45-degree angle",
        composition: "Tight crop on the most appetising part of the dish, soft background blur",
    },
];

pub static IMPERFECTION_PHRASES: [&str; 8] = [
    "slight sauce drip on plate edge",
    "one herb leaf slightly wilted",
    "steam rising from hot food",
    "napkin slightly crumpled in background",
    "fingerprint smudge on plate rim",
    "uneven browning on surface",
    "small bubble in sauce",
    "garnish placed slightly off-center",
];

pub const DEFAULT_REALISM_DETAILS: usize = 2;

const NO_PEOPLE: &str = "No people, no hands, no arms, no human body parts anywhere in the frame.";

/// English and native names of the language a locale asks for.
pub fn language_for_locale(locale: &str) -> (String, String) {
    let primary = locale.split(['-', '_']).next().unwrap_or(locale).to_ascii_lowercase();
    let known = match primary.as_str() {
        "ko" => Some(("Korean", "한국어")),
        "en" => Some(("English", "English")),
        "ja" => Some(("Japanese", "日本語")),
        "zh" => Some(("Chinese", "中文")),
        "fr" => Some(("French", "Français")),
        "es" => Some(("Spanish", "Español")),
        "it" => Some(("Italian", "Italiano")),
        "de" => Some(("German", "Deutsch")),
        _ => None,
    };
    match known {
        Some((en, native)) => (en.to_string(), native.to_string()),
        None => (locale.to_string(), locale.to_string()),
    }
}

pub fn build_system_prompt(persona: &Persona) -> String {
    let (language, native) = language_for_locale(&persona.locale);
    let language_label = if language == native { language.clone() } else { format!("{language} ({native})") };
    let tone = persona
        .tone
        .as_deref()
        .map(|t| format!("Tone of voice: {t}\n"))
        .unwrap_or_default();
    let specialties = if persona.specialties.is_empty() {
        String::new()
    } else {
        format!("Your specialties: {}.\n", persona.specialties.join(", "))
    };

    format!(
        "You are {display}, a home cooking creator who writes recipes for a cooking community.\n\
         {tone}Kitchen style: {style}\n\
         {specialties}\n\
         LANGUAGE RULE: You MUST write ALL generated text (titles, descriptions, ingredient names, amounts, steps, hashtags) ONLY in {language_label}. \
         Never mix in any other language, even for dish names that are commonly written in another language.\n\
         Always reply with a single JSON object and nothing else.",
        display = persona.display_name,
        style = persona.kitchen_style_prompt,
    )
}

pub fn build_recipe_prompt(subject: &str) -> String {
    format!(
        "Create an original recipe for: {subject}.\n\
         Reply with JSON of exactly this shape:\n\
         {{\"title\": string, \"description\": string, \
         \"ingredients\": [{{\"name\": string, \"amount\": string}}], \
         \"steps\": [{{\"order\": number, \"description\": string}}], \
         \"hashtags\": [string]}}\n\
         Use 4 to 8 clear steps numbered from 1."
    )
}

pub fn build_suggestion_prompt(persona: &Persona, count: usize, exclude: &[String]) -> String {
    let exclusion = if exclude.is_empty() {
        String::new()
    } else {
        format!("Do NOT suggest any of these dishes (already published): {}.\n", exclude.join(", "))
    };
    let focus = if persona.specialties.is_empty() {
        String::new()
    } else {
        format!(" that fit your specialties ({})", persona.specialties.join(", "))
    };
    format!(
        "Suggest {count} dish names{focus}.\n\
         {exclusion}\
         Reply with JSON of exactly this shape: {{\"dishes\": [string]}}"
    )
}

pub fn build_variant_prompt(parent: &GeneratedDocument, variation: &str) -> String {
    let ingredients = parent
        .ingredients
        .iter()
        .map(|i| format!("- {} {}", i.name, i.amount))
        .collect::<Vec<_>>()
        .join("\n");
    let steps = parent
        .steps
        .iter()
        .map(|s| format!("{}. {}", s.order, s.instruction))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Create a variation of this recipe. Variation: {variation}.\n\n\
         Original title: {title}\n\
         Original description: {description}\n\
         Original ingredients:\n{ingredients}\n\
         Original steps:\n{steps}\n\n\
         Reply with JSON of exactly this shape:\n\
         {{\"title\": string, \"description\": string, \
         \"ingredients\": [{{\"name\": string, \"amount\": string}}], \
         \"steps\": [{{\"order\": number, \"description\": string}}], \
         \"hashtags\": [string], \"changeDiff\": string, \"changeReason\": string, \
         \"changeCategories\": [string]}}",
        title = parent.title,
        description = parent.description,
    )
}

/// Angle used for a request. Cover images wrap around the angle list; step and
/// log images always use the overhead angle.
pub fn angle_for(style: ImageStyle, angle_index: usize) -> &'static CoverAngle {
    match style {
        ImageStyle::Cover => &COVER_CAMERA_ANGLES[angle_index % COVER_CAMERA_ANGLES.len()],
        ImageStyle::Step | ImageStyle::Log => &COVER_CAMERA_ANGLES[0],
    }
}

pub fn build_image_prompt(subject: &str, persona: &Persona, style: ImageStyle, angle_index: usize) -> String {
    let angle = angle_for(style, angle_index);
    let scene = match style {
        ImageStyle::Cover => {
            "Beautifully plated, appetizing, natural lighting, shallow depth of field.\n\
             High-quality food photography style, 4K, detailed textures."
        }
        ImageStyle::Step => {
            "Cooking in progress, ingredients and utensils on the counter, food mid-preparation in the pan or bowl.\n\
             Realistic home cooking scene, natural lighting."
        }
        ImageStyle::Log => {
            "Casual food photo style, slightly imperfect, like a real user photo.\n\
             Shot with phone camera, natural indoor lighting, realistic presentation."
        }
    };

    format!(
        "Professional food photography of {subject}.\n\
         {angle_desc}. {composition}.\n\
         {kitchen}\n\
         {scene}\n\
         {NO_PEOPLE}\n\
         Styling constraints: no extra garnish and no decorative plate styling beyond the kitchen style above.",
        angle_desc = angle.angle_desc,
        composition = angle.composition,
        kitchen = persona.kitchen_style_prompt,
    )
}

/// Appends `count` distinct imperfection phrases drawn without replacement.
pub fn with_realism_details<R: Rng + ?Sized>(prompt: &str, rng: &mut R, count: usize) -> String {
    let selected: Vec<&str> = IMPERFECTION_PHRASES.choose_multiple(rng, count).copied().collect();
    if selected.is_empty() {
        return prompt.to_string();
    }
    format!("{prompt}\nSubtle realistic details: {}.", selected.join(", "))
}
