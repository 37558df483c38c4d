use std::env;

use crate::normalize::{JPEG_QUALITY, MAX_DIM};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PROMPT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 120.0;

/// Engine settings resolved from the environment, overridable by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub prompt_model: String,
    pub image_model: String,
    pub request_timeout_s: f64,
    pub max_dim: u32,
    pub jpeg_quality: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            prompt_model: DEFAULT_PROMPT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            max_dim: MAX_DIM,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset
    /// and unparsable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            api_key: read("GEMINI_API_KEY")
                .or_else(|| read("GOOGLE_API_KEY"))
                .or_else(|| read("API_KEY")),
            api_base: read("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            prompt_model: read("BANANA_PROMPT_MODEL").unwrap_or(defaults.prompt_model),
            image_model: read("BANANA_IMAGE_MODEL").unwrap_or(defaults.image_model),
            request_timeout_s: read("BANANA_REQUEST_TIMEOUT")
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(defaults.request_timeout_s),
            max_dim: read("BANANA_MAX_DIM")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_dim),
            jpeg_quality: read("BANANA_JPEG_QUALITY")
                .and_then(|value| value.parse::<f32>().ok())
                .filter(|value| *value > 0.0 && *value <= 1.0)
                .unwrap_or(defaults.jpeg_quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_dim, 1024);
        assert!((config.jpeg_quality - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn api_key_falls_back_through_aliases_and_skips_blanks() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "   "),
            ("GOOGLE_API_KEY", "google-key"),
            ("API_KEY", "plain-key"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("google-key"));
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_BASE", "http://localhost:9000/v1/"),
            ("BANANA_IMAGE_MODEL", "custom-image"),
            ("BANANA_MAX_DIM", "512"),
            ("BANANA_JPEG_QUALITY", "1.5"),
            ("BANANA_REQUEST_TIMEOUT", "nope"),
        ]));
        assert_eq!(config.api_base, "http://localhost:9000/v1");
        assert_eq!(config.image_model, "custom-image");
        assert_eq!(config.max_dim, 512);
        assert!((config.jpeg_quality - JPEG_QUALITY).abs() < f32::EPSILON);
        assert!((config.request_timeout_s - DEFAULT_REQUEST_TIMEOUT_S).abs() < f64::EPSILON);
    }
}
