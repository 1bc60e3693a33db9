use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::io::Read;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server};
use tracing::{error, info};

use crate::analysis;
use crate::chat;
use crate::config::{ModelConfig, SwarmConfig};
use crate::legal::{AgentType, LegalSwarm};
use crate::provider::{self, ChatMessage, Provider, Role};
use crate::translate::{self, TargetLanguage};

const MAX_REQUEST_BYTES: usize = 5 * 1024 * 1024;

/// Everything a request handler needs; built once before serving.
pub struct ApiState {
    swarm: LegalSwarm,
    provider: Arc<dyn Provider>,
    model: ModelConfig,
}

impl ApiState {
    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        let provider = provider::build_provider(&config.model)?;
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: &SwarmConfig, provider: Arc<dyn Provider>) -> Result<Self> {
        Ok(Self {
            swarm: LegalSwarm::with_provider(config, provider.clone())?,
            provider,
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl ApiResponse {
    fn ok(body: JsonValue) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentsRequest {
    #[serde(default)]
    task: Option<String>,
    #[serde(default = "default_agent_type", rename = "agentType")]
    agent_type: String,
}

fn default_agent_type() -> String {
    AgentType::Swarm.as_str().to_string()
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct TranslateBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "targetLanguage")]
    target_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(default, rename = "documentText")]
    document_text: Option<String>,
    #[serde(default, rename = "fileName")]
    file_name: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.trim().is_empty())
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiResponse> {
    serde_json::from_slice(body)
        .map_err(|err| ApiResponse::error(400, &format!("invalid JSON body: {err}")))
}

/// Route one request. Pure with respect to I/O so it can be tested directly.
pub fn handle(state: &ApiState, method: &Method, url: &str, body: &[u8]) -> ApiResponse {
    let path = url.split('?').next().unwrap_or(url);
    let result = match (method, path) {
        (Method::Get, "/health") => Ok(ApiResponse::ok(json!({ "ok": true }))),
        (Method::Post, "/api/agents") => parse_body(body).map(|req| handle_agents(state, req)),
        (Method::Post, "/api/chat") => parse_body(body).map(|req| handle_chat(state, req)),
        (Method::Post, "/api/translate") => {
            parse_body(body).map(|req| handle_translate(state, req))
        }
        (Method::Post, "/api/documents/analyze") => {
            parse_body(body).map(|req| handle_analyze(state, req))
        }
        _ => Ok(ApiResponse::error(404, "Not found")),
    };
    result.unwrap_or_else(|resp| resp)
}

fn handle_agents(state: &ApiState, req: AgentsRequest) -> ApiResponse {
    let Some(task) = present(&req.task) else {
        return ApiResponse::error(400, "Task is required");
    };
    match state.swarm.run_legal_swarm(task, &req.agent_type) {
        Ok(result) => ApiResponse::ok(json!({
            "result": result.trim(),
            "agentType": req.agent_type,
            "task": task,
        })),
        Err(err) => {
            error!(error = %format!("{err:#}"), "legal agents failed");
            ApiResponse {
                status: 500,
                body: json!({
                    "error": "Failed to run legal agents",
                    "details": format!("{err:#}"),
                }),
            }
        }
    }
}

fn handle_chat(state: &ApiState, req: ChatBody) -> ApiResponse {
    match req.messages.last() {
        None => return ApiResponse::error(400, "Messages are required"),
        Some(m) if m.role != Role::User => {
            return ApiResponse::error(400, "Last message must be from the user")
        }
        Some(_) => {}
    }
    match chat::chat(state.provider.as_ref(), &state.model, &req.messages) {
        Ok(message) => ApiResponse::ok(json!({ "message": message })),
        Err(err) => {
            error!(error = %format!("{err:#}"), "chat failed");
            ApiResponse::error(500, "Internal server error")
        }
    }
}

fn handle_translate(state: &ApiState, req: TranslateBody) -> ApiResponse {
    let (Some(text), Some(lang)) = (present(&req.text), present(&req.target_language)) else {
        return ApiResponse::error(400, "Missing text or target language");
    };
    let target = TargetLanguage::from_code(lang);
    match translate::translate(state.provider.as_ref(), &state.model, text, target) {
        Ok(translated) => ApiResponse::ok(json!({ "translatedText": translated })),
        Err(err) => {
            error!(error = %format!("{err:#}"), "translation failed");
            ApiResponse::error(500, "Translation failed")
        }
    }
}

fn handle_analyze(state: &ApiState, req: AnalyzeBody) -> ApiResponse {
    let Some(text) = present(&req.document_text) else {
        return ApiResponse::error(400, "Document text is required");
    };
    let file_name = req.file_name.as_deref().unwrap_or("document");
    match analysis::analyze_document(state.provider.as_ref(), &state.model, text, file_name) {
        Ok(a) => match serde_json::to_value(&a) {
            Ok(v) => ApiResponse::ok(v),
            Err(_) => ApiResponse::error(500, "Failed to analyze document"),
        },
        Err(err) => {
            error!(error = %format!("{err:#}"), "document analysis failed");
            ApiResponse::error(500, "Failed to analyze document")
        }
    }
}

/// Serve requests one at a time until the listener closes.
pub fn run_server(bind_addr: &str, state: &ApiState) -> Result<()> {
    let server = Server::http(bind_addr)
        .map_err(|err| anyhow!("failed to bind api server at {bind_addr}: {err}"))?;
    info!(bind = %bind_addr, "legal-swarm api listening");

    for mut request in server.incoming_requests() {
        let method = request.method().clone();
        let url = request.url().to_string();

        let mut body: Vec<u8> = Vec::new();
        request
            .as_reader()
            .take((MAX_REQUEST_BYTES + 1) as u64)
            .read_to_end(&mut body)
            .context("failed to read request body")?;

        let resp = if body.len() > MAX_REQUEST_BYTES {
            ApiResponse::error(413, "request payload exceeds 5 MiB limit")
        } else {
            handle(state, &method, &url, &body)
        };
        info!(method = %method, url = %url, status = resp.status, "request handled");
        request.respond(json_response(resp.status, serde_json::to_vec(&resp.body)?))?;
    }
    Ok(())
}

fn json_response(code: u16, body: Vec<u8>) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(body).with_status_code(code);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    response
}
