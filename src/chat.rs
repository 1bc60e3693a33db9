use anyhow::{anyhow, Context, Result};

use crate::config::{Feature, ModelConfig};
use crate::provider::{ChatMessage, ChatRequest, Provider, Role};

pub const LEGAL_ASSISTANT_PROMPT: &str = "You are an AI legal assistant providing general legal information and guidance.

IMPORTANT GUIDELINES:
- Always provide helpful, accurate legal information
- Clearly state that you provide general information, not legal advice
- Recommend consulting with a qualified attorney for specific legal matters
- Be professional, clear, and comprehensive in your responses
- Focus on explaining legal concepts, procedures, and general guidance
- If asked about specific cases, provide general principles rather than case-specific advice

You can help with:
- Contract law basics and key elements
- Employment law compliance
- Intellectual property fundamentals
- Business law concepts
- Civil and criminal law differences
- Legal procedures and processes
- Document requirements and standards

Always maintain a professional, helpful tone while being clear about the limitations of AI legal assistance.";

/// One assistant reply to a conversation that must end with a user turn.
pub fn chat(provider: &dyn Provider, model: &ModelConfig, messages: &[ChatMessage]) -> Result<String> {
    match messages.last() {
        None => return Err(anyhow!("chat requires at least one message")),
        Some(m) if m.role != Role::User => {
            return Err(anyhow!("chat history must end with a user message"))
        }
        Some(_) => {}
    }

    let req = ChatRequest {
        model: model.model_for(Feature::Chat).to_string(),
        temperature: model.temperature,
        system: Some(LEGAL_ASSISTANT_PROMPT.to_string()),
        messages: messages.to_vec(),
    };
    provider.complete(&req).context("legal assistant chat failed")
}
