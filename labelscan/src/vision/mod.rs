//! Remote vision model
//!
//! Sends the untouched upload to an OpenAI-compatible multimodal model and
//! returns whatever the model answers. No preprocessing, no retries.

mod client;
mod provider;

pub use client::VisionClient;
pub use provider::VisionProvider;

/// Default question asked about a nutrition label: protein, fat,
/// carbohydrate, sodium and energy.
pub const DEFAULT_NUTRITION_PROMPT: &str = "蛋白质、脂肪、碳水、钠、能量，分别是多少？";
