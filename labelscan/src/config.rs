use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::vision::DEFAULT_NUTRITION_PROMPT;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

/// Like [`parse_env_or`], but zero is rejected as well.
fn parse_env_nonzero<T>(var: &str, default: T) -> T
where
    T: std::str::FromStr + PartialEq + Default + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    let value = parse_env_or(var, default);
    if value == T::default() {
        tracing::warn!("Invalid value '{}' for {}: must be greater than zero. Using default.", value, var);
        return default;
    }
    value
}

/// Reads a secret-like variable, treating an empty or blank value as unset.
fn non_blank_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub ocr: OcrConfig,
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language set, `+`-separated (e.g. `chi_sim+eng`).
    pub languages: String,
    /// Directory holding traineddata files; `None` uses the Tesseract default.
    pub data_path: Option<String>,
    pub max_image_dimension: u32,
}

/// Remote multimodal model configuration.
///
/// Read once at startup; the credential is never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
    pub prompt: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: "chi_sim".to_string(),
            data_path: None,
            max_image_dimension: 4096,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            max_tokens: None,
            prompt: DEFAULT_NUTRITION_PROMPT.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("LABELSCAN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("LABELSCAN_PORT", 3000),
                max_upload_bytes: parse_env_or("MAX_UPLOAD_SIZE", 10 * 1024 * 1024),
            },
            uploads: UploadConfig {
                dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./uploads")),
            },
            ocr: OcrConfig {
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "chi_sim".to_string()),
                data_path: env::var("OCR_DATA_PATH").ok(),
                max_image_dimension: parse_env_nonzero("OCR_MAX_DIMENSION", 4096),
            },
            vision: VisionConfig {
                model: env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                api_key: non_blank_env("OPENAI_API_KEY"),
                base_url: env::var("OPENAI_BASE_URL").ok(),
                timeout_secs: parse_env_nonzero("VISION_TIMEOUT", 60),
                max_tokens: parse_env_opt("VISION_MAX_TOKENS"),
                prompt: non_blank_env("VISION_PROMPT")
                    .unwrap_or_else(|| DEFAULT_NUTRITION_PROMPT.to_string()),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
