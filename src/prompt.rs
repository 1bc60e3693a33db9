use sha2::{Digest, Sha256};

use crate::provider::{ChatMessage, ChatRequest, Role};

/// Hash rendered prompt text for trace events.
pub fn hash_prompt(prompt_text: &str) -> String {
    let digest = Sha256::digest(prompt_text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Flatten a chat request into one deterministic text blob, for providers that
/// take a single prompt string.
pub fn render_transcript(req: &ChatRequest) -> String {
    let mut out = String::new();

    if let Some(s) = req.system.as_deref() {
        out.push_str("SYSTEM:\n");
        out.push_str(s.trim());
        out.push_str("\n\n");
    }
    for m in &req.messages {
        let label = match m.role {
            Role::User => "USER:\n",
            Role::Assistant => "ASSISTANT:\n",
        };
        out.push_str(label);
        out.push_str(m.content.trim());
        out.push_str("\n\n");
    }

    out.trim().to_string()
}

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Drop the oldest messages until system prompt plus history fits within
/// `context_length` estimated tokens. The newest message is always kept.
pub fn fit_to_context(
    system: Option<&str>,
    messages: &[ChatMessage],
    context_length: usize,
) -> Vec<ChatMessage> {
    let system_tokens = system.map(estimate_tokens).unwrap_or(0);
    let mut budget = context_length.saturating_sub(system_tokens);

    let mut kept: Vec<ChatMessage> = Vec::new();
    for (idx, m) in messages.iter().enumerate().rev() {
        let cost = estimate_tokens(&m.content);
        let newest = idx + 1 == messages.len();
        if cost > budget && !newest {
            break;
        }
        budget = budget.saturating_sub(cost);
        kept.push(m.clone());
    }
    kept.reverse();
    kept
}
