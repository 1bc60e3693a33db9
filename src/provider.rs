use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{ModelConfig, ProviderKind};
use crate::error::ProviderError;
use crate::prompt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One model call: system prompt plus an ordered conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// A minimal blocking provider interface.
pub trait Provider: Send + Sync {
    fn complete(&self, req: &ChatRequest) -> Result<String>;
}

/// Factory: build the provider selected by `cfg.provider`.
pub fn build_provider(cfg: &ModelConfig) -> Result<Arc<dyn Provider>> {
    match cfg.provider {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::from_config(cfg)?)),
        ProviderKind::Http => Ok(Arc::new(HttpProvider::from_config(cfg)?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::from_config(cfg))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build http client")
}

fn trimmed_body(text: &str) -> String {
    text.trim().chars().take(200).collect()
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let base = cfg.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(anyhow!("openai provider requires model.base_url"));
        }
        Ok(Self {
            endpoint: format!("{base}/chat/completions"),
            api_key: cfg.api_key.clone(),
            api_key_env: cfg.api_key_env.clone(),
            timeout_secs: cfg.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(req: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = req.system.as_deref() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for m in &req.messages {
            messages.push(json!({ "role": m.role.as_str(), "content": m.content }));
        }
        json!({
            "model": req.model,
            "temperature": req.temperature,
            "messages": messages,
        })
    }
}

impl Provider for OpenAiProvider {
    fn complete(&self, req: &ChatRequest) -> Result<String> {
        let token = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential(self.api_key_env.clone()))?;

        let client = http_client(self.timeout_secs)?;
        let resp = client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&Self::request_body(req))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!(ProviderError::Timeout {
                        provider: "openai",
                        secs: self.timeout_secs,
                    })
                } else {
                    anyhow!(err).context("openai provider request failed")
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(ProviderError::BadStatus {
                provider: "openai",
                status: status.as_u16(),
                body: trimmed_body(&text),
            }
            .into());
        }

        let json: Value = resp
            .json()
            .context("openai provider response was not valid JSON")?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or(ProviderError::MissingField {
                provider: "openai",
                field: "choices[0].message.content",
            })?;
        Ok(content.to_string())
    }
}

/// Generic JSON endpoint: `{"prompt": ...}` in, `{"output": ...}` out.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpProvider {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let endpoint = cfg.base_url.trim();
        if endpoint.is_empty() {
            return Err(anyhow!("http provider requires model.base_url"));
        }
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: cfg.api_key.clone(),
            timeout_secs: cfg.timeout_secs,
        })
    }
}

impl Provider for HttpProvider {
    fn complete(&self, req: &ChatRequest) -> Result<String> {
        let client = http_client(self.timeout_secs)?;
        let mut builder = client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(token) = self.api_key.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let body = json!({
            "model": req.model,
            "temperature": req.temperature,
            "prompt": prompt::render_transcript(req),
        });
        let resp = builder.json(&body).send().map_err(|err| {
            if err.is_timeout() {
                anyhow!(ProviderError::Timeout {
                    provider: "http",
                    secs: self.timeout_secs,
                })
            } else {
                anyhow!(err).context("http provider request failed")
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(ProviderError::BadStatus {
                provider: "http",
                status: status.as_u16(),
                body: trimmed_body(&text),
            }
            .into());
        }

        let json: Value = resp
            .json()
            .context("http provider response was not valid JSON")?;
        let out = json
            .get("output")
            .and_then(|v| v.as_str())
            .ok_or(ProviderError::MissingField {
                provider: "http",
                field: "output",
            })?;
        Ok(out.to_string())
    }
}

/// Ollama provider (blocking) using the local `ollama` CLI.
///
/// The request temperature is not forwarded, so dynamic temperature has no
/// effect on this backend.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaProvider {
    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self {
            model: cfg.name.clone(),
            timeout_secs: cfg.timeout_secs,
        }
    }
}

impl Provider for OllamaProvider {
    fn complete(&self, req: &ChatRequest) -> Result<String> {
        // The request model wins so per-feature overrides reach the CLI.
        let model = if req.model.trim().is_empty() {
            self.model.as_str()
        } else {
            req.model.as_str()
        };
        let prompt_text = prompt::render_transcript(req);
        // `ollama run` has no temperature flag; the model's own setting applies.
        debug!(
            model,
            requested_temperature = req.temperature,
            "ollama ignores per-request temperature"
        );

        let mut child = Command::new(ollama_bin())
            .arg("run")
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| "failed to spawn `ollama run` (is Ollama installed and on PATH?)")?;

        let stdout = child
            .stdout
            .take()
            .context("failed to open stdout for ollama")?;
        let stderr = child
            .stderr
            .take()
            .context("failed to open stderr for ollama")?;

        // Drain both pipes so a chatty child cannot block on a full buffer.
        let out_handle = thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut r = stdout;
            let mut buf = Vec::new();
            r.read_to_end(&mut buf)?;
            Ok(buf)
        });
        let err_handle = thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut r = stderr;
            let mut buf = Vec::new();
            r.read_to_end(&mut buf)?;
            Ok(buf)
        });

        {
            let mut stdin = child
                .stdin
                .take()
                .context("failed to open stdin for ollama")?;
            stdin
                .write_all(prompt_text.as_bytes())
                .context("failed writing prompt to ollama stdin")?;
        }

        let start = Instant::now();
        let timeout = Duration::from_secs(self.timeout_secs);
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .context("failed waiting for ollama process")?
            {
                break status;
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProviderError::Timeout {
                    provider: "ollama",
                    secs: self.timeout_secs,
                }
                .into());
            }
            thread::sleep(Duration::from_millis(10));
        };

        let out_buf = out_handle
            .join()
            .map_err(|_| anyhow!("stdout reader thread panicked"))?
            .context("failed reading ollama stdout")?;
        let err_buf = err_handle
            .join()
            .map_err(|_| anyhow!("stderr reader thread panicked"))?
            .context("failed reading ollama stderr")?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err_buf);
            return Err(anyhow!(
                "ollama run failed (exit={:?}): {}",
                status.code(),
                stderr.trim()
            ));
        }

        String::from_utf8(out_buf).context("ollama output was not valid UTF-8")
    }
}

fn ollama_bin() -> PathBuf {
    env::var_os("LEGAL_SWARM_OLLAMA_BIN")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ollama"))
}
