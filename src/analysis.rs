use anyhow::{anyhow, Context, Result};
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::{Feature, ModelConfig};
use crate::provider::{ChatMessage, ChatRequest, Provider};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Structured review of a legal document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentAnalysis {
    /// The type of legal document (e.g., Contract, Agreement, etc.)
    pub document_type: String,

    /// Important clauses, terms, or provisions found in the document
    pub key_findings: Vec<String>,

    /// Overall risk level of the document
    pub risk_assessment: RiskLevel,

    /// Actionable recommendations for the document
    pub recommendations: Vec<String>,

    /// A comprehensive summary of the document analysis
    pub summary: String,
}

static ANALYSIS_SCHEMA_JSON: Lazy<JsonValue> = Lazy::new(|| {
    let schema = schema_for!(DocumentAnalysis);
    serde_json::to_value(&schema).expect("schemars schema must serialize to JSON")
});

static ANALYSIS_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&ANALYSIS_SCHEMA_JSON)
        .expect("failed to compile document analysis JSON schema")
});

pub const ANALYST_PROMPT: &str = "You are an expert legal document analyzer. Analyze the provided legal document and provide:

1. Document Type: Identify what type of legal document this is
2. Key Findings: List the most important clauses, terms, and provisions
3. Risk Assessment: Evaluate the overall risk level (low/medium/high) based on:
   - Unusual or potentially problematic clauses
   - Missing standard protections
   - Ambiguous language
   - Potential legal issues
4. Recommendations: Provide specific, actionable recommendations
5. Summary: A comprehensive analysis summary

Be thorough, professional, and focus on practical legal insights. Always remind that this is general analysis and specific legal advice should come from a qualified attorney.";

pub fn analysis_schema() -> &'static JsonValue {
    &ANALYSIS_SCHEMA_JSON
}

fn analysis_request(text: &str, file_name: &str) -> String {
    let schema = serde_json::to_string_pretty(analysis_schema()).unwrap_or_default();
    format!(
        "Analyze this legal document:\n\n\
         Filename: {file_name}\n\n\
         Document Content:\n{text}\n\n\
         Provide a comprehensive legal analysis.\n\n\
         Respond with a single JSON object matching this JSON Schema and nothing else:\n{schema}"
    )
}

/// Read the first JSON object in a model reply. Code fences and prose on
/// either side are ignored, and so are stray braces before the object.
pub fn first_json_object(reply: &str) -> Result<JsonValue> {
    let mut first_err = None;
    for (start, _) in reply.match_indices('{') {
        let mut values =
            serde_json::Deserializer::from_str(&reply[start..]).into_iter::<JsonValue>();
        match values.next() {
            Some(Ok(value)) if value.is_object() => return Ok(value),
            Some(Err(err)) if first_err.is_none() => first_err = Some(err),
            _ => {}
        }
    }
    match first_err {
        Some(err) => Err(anyhow!(err).context("model reply was not valid JSON")),
        None => Err(anyhow!("model reply did not contain a JSON object")),
    }
}

/// Validate a model reply against the analysis schema and deserialize it.
pub fn parse_analysis(reply: &str) -> Result<DocumentAnalysis> {
    let value = first_json_object(reply)?;

    let result: Result<()> = match ANALYSIS_SCHEMA.validate(&value) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let msgs: Vec<String> = errors
                .take(10)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("at {path}: {e}")
                })
                .collect();
            Err(anyhow!(
                "document analysis failed schema validation:\n{}",
                msgs.join("\n")
            ))
        }
    };
    result?;

    serde_json::from_value(value).context("deserialize document analysis")
}

pub fn analyze_document(
    provider: &dyn Provider,
    model: &ModelConfig,
    text: &str,
    file_name: &str,
) -> Result<DocumentAnalysis> {
    if text.trim().is_empty() {
        return Err(anyhow!("document text is required"));
    }
    let req = ChatRequest {
        model: model.model_for(Feature::Analysis).to_string(),
        temperature: model.temperature,
        system: Some(ANALYST_PROMPT.to_string()),
        messages: vec![ChatMessage::user(analysis_request(text, file_name))],
    };
    let reply = provider
        .complete(&req)
        .with_context(|| format!("analysis request failed for '{file_name}'"))?;
    parse_analysis(&reply).with_context(|| format!("could not use analysis of '{file_name}'"))
}
