use anyhow::{anyhow, Context, Result};

use crate::config::{Feature, ModelConfig};
use crate::provider::{ChatMessage, ChatRequest, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLanguage {
    Chinese,
    English,
}

impl TargetLanguage {
    /// `"zh"` selects Chinese; every other code falls back to English.
    pub fn from_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("zh") {
            TargetLanguage::Chinese
        } else {
            TargetLanguage::English
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "Simplified Chinese (Mandarin)",
            TargetLanguage::English => "English",
        }
    }
}

pub fn translation_prompt(text: &str, target: TargetLanguage) -> String {
    format!(
        "Translate the following text to {}. Only return the translation, no explanations:\n\n{}",
        target.describe(),
        text
    )
}

pub fn translate(
    provider: &dyn Provider,
    model: &ModelConfig,
    text: &str,
    target: TargetLanguage,
) -> Result<String> {
    if text.trim().is_empty() {
        return Err(anyhow!("nothing to translate"));
    }
    let req = ChatRequest {
        model: model.model_for(Feature::Translate).to_string(),
        temperature: model.temperature,
        system: None,
        messages: vec![ChatMessage::user(translation_prompt(text, target))],
    };
    let out = provider
        .complete(&req)
        .with_context(|| format!("translation to {} failed", target.describe()))?;
    Ok(out.trim().to_string())
}
