use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GenerationError, Result};
use crate::gemini::{DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::images::ImageOptions;
use crate::retry::RetryPolicy;

/// Process settings, read from the environment (and `.env` via `dotenv` in `main`).
#[derive(Clone)]
pub struct Settings {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub http_timeout: Duration,
    pub port: u16,
    pub image: ImageOptions,
    pub default_cover_count: usize,
    pub retry_max_attempts: u32,
    /// Load personas from this directory instead of the bundled set.
    pub persona_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("gemini_api_key", &crate::gemini::redact_key(&self.gemini_api_key))
            .field("gemini_api_base", &self.gemini_api_base)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("http_timeout", &self.http_timeout)
            .field("port", &self.port)
            .field("image", &self.image)
            .field("default_cover_count", &self.default_cover_count)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("persona_dir", &self.persona_dir)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gemini_api_key = get("GEMINI_API_KEY")
            .ok_or_else(|| GenerationError::Config("GEMINI_API_KEY is not set".into()))?;
        let defaults = ImageOptions::default();

        Ok(Self {
            gemini_api_key,
            gemini_api_base: get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            text_model: get("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: get("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 120)?),
            port: parse_or(&get, "PORT", 8080)?,
            image: ImageOptions {
                max_width: parse_or(&get, "IMAGE_MAX_WIDTH", defaults.max_width)?,
                max_height: parse_or(&get, "IMAGE_MAX_HEIGHT", defaults.max_height)?,
                quality: parse_or(&get, "IMAGE_QUALITY", defaults.quality)?,
                max_concurrency: parse_or(&get, "IMAGE_MAX_CONCURRENCY", defaults.max_concurrency)?,
                realism_details: defaults.realism_details,
            },
            default_cover_count: parse_or(&get, "DEFAULT_COVER_COUNT", 1)?,
            retry_max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", RetryPolicy::DEFAULT_MAX_ATTEMPTS)?,
            persona_dir: get("PERSONA_DIR").map(PathBuf::from),
        })
    }

    pub fn image_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::image_default().with_max_attempts(self.retry_max_attempts)
    }

    pub fn text_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::text_default().with_max_attempts(self.retry_max_attempts)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| GenerationError::Config(format!("{key}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(settings(&[]), Err(GenerationError::Config(_))));
        assert!(matches!(settings(&[("GEMINI_API_KEY", "  ")]), Err(GenerationError::Config(_))));
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("GEMINI_API_KEY", "AIzaSyTEST")]).unwrap();
        assert_eq!(s.gemini_api_base, DEFAULT_API_BASE);
        assert_eq!(s.port, 8080);
        assert_eq!(s.image, ImageOptions::default());
        assert_eq!(s.retry_max_attempts, 3);
        assert_eq!(s.image_retry_policy(), RetryPolicy::image_default());
        assert!(s.persona_dir.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("GEMINI_API_KEY", "AIzaSyTEST"),
            ("PORT", "9000"),
            ("IMAGE_MAX_WIDTH", "800"),
            ("IMAGE_QUALITY", "70"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("PERSONA_DIR", "/etc/personas"),
        ])
        .unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.image.max_width, 800);
        assert_eq!(s.image.quality, 70);
        assert_eq!(s.text_retry_policy().max_attempts, 5);
        assert_eq!(s.persona_dir, Some(PathBuf::from("/etc/personas")));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = settings(&[("GEMINI_API_KEY", "k"), ("IMAGE_QUALITY", "high")]).unwrap_err();
        assert!(err.to_string().contains("IMAGE_QUALITY"));
    }

    #[test]
    fn debug_hides_api_key() {
        let s = settings(&[("GEMINI_API_KEY", "AIzaSySECRETVALUE")]).unwrap();
        assert!(!format!("{s:?}").contains("SECRETVALUE"));
    }
}
