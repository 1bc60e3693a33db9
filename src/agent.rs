use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Feature, ModelConfig};
use crate::prompt;
use crate::provider::{ChatMessage, ChatRequest, Provider};
use crate::state::{self, AgentState};

/// Static description of one agent: who it is and how it calls the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    pub system_prompt: String,

    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    #[serde(default)]
    pub autosave: bool,

    /// Print a descriptor summary before each run.
    #[serde(default)]
    pub dashboard: bool,

    /// Log per-loop progress at info instead of debug.
    #[serde(default)]
    pub verbose: bool,

    /// Sample a fresh temperature in [0, 1) for every loop. Backends that take
    /// no temperature (the Ollama CLI) ignore it.
    #[serde(default)]
    pub dynamic_temperature_enabled: bool,

    /// State file, relative to the configured state directory.
    #[serde(default)]
    pub saved_state_path: Option<PathBuf>,

    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Total attempts per model call (at least one is always made).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Estimated token budget for system prompt plus conversation.
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            max_loops: default_max_loops(),
            autosave: false,
            dashboard: false,
            verbose: false,
            dynamic_temperature_enabled: false,
            saved_state_path: None,
            user_name: default_user_name(),
            retry_attempts: default_retry_attempts(),
            context_length: default_context_length(),
        }
    }
}

fn default_max_loops() -> u32 {
    1
}

fn default_user_name() -> String {
    "user".to_string()
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_context_length() -> usize {
    8192
}

/// An agent descriptor bound to a model backend.
#[derive(Clone)]
pub struct Agent {
    spec: AgentSpec,
    model: String,
    temperature: f32,
    provider: Arc<dyn Provider>,
    state_dir: PathBuf,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("spec", &self.spec)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl Agent {
    pub fn new(
        spec: AgentSpec,
        model: &ModelConfig,
        provider: Arc<dyn Provider>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spec,
            model: model.model_for(Feature::Agents).to_string(),
            temperature: model.temperature,
            provider,
            state_dir: state_dir.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Absolute-or-relative location of the autosave file, if any.
    pub fn state_path(&self) -> Option<PathBuf> {
        self.spec
            .saved_state_path
            .as_deref()
            .map(|p| self.state_dir.join(p))
    }

    pub fn dashboard(&self) -> String {
        let s = &self.spec;
        let state = self
            .state_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Agent:        {}\n\
             Model:        {} (temperature {}{})\n\
             Loops:        {}\n\
             Retries:      {}\n\
             Context:      {} tokens\n\
             User:         {}\n\
             State:        {}{}",
            s.name,
            self.model,
            self.temperature,
            if s.dynamic_temperature_enabled {
                ", dynamic"
            } else {
                ""
            },
            s.max_loops,
            s.retry_attempts,
            s.context_length,
            s.user_name,
            state,
            if s.autosave { " (autosave)" } else { "" },
        )
    }

    /// Run `task` through this agent and return the last model response.
    pub fn run(&self, task: &str) -> Result<String> {
        if self.spec.dashboard {
            println!("{}", self.dashboard());
        }

        let mut conversation = vec![ChatMessage::user(task)];
        let loops = self.spec.max_loops.max(1);
        let mut last = String::new();

        for loop_idx in 0..loops {
            let temperature = self.loop_temperature();
            let messages = prompt::fit_to_context(
                Some(&self.spec.system_prompt),
                &conversation,
                self.spec.context_length,
            );
            if messages.len() < conversation.len() {
                debug!(
                    agent = %self.spec.name,
                    dropped = conversation.len() - messages.len(),
                    "trimmed conversation to fit context"
                );
            }
            let req = ChatRequest {
                model: self.model.clone(),
                temperature,
                system: Some(self.spec.system_prompt.clone()),
                messages,
            };

            if self.spec.verbose {
                info!(agent = %self.spec.name, loop_idx, temperature, "agent loop started");
            } else {
                debug!(agent = %self.spec.name, loop_idx, temperature, "agent loop started");
            }

            last = self.complete_with_retry(&req)?;
            conversation.push(ChatMessage::assistant(last.clone()));
        }

        if self.spec.autosave {
            if let Some(path) = self.state_path() {
                self.save(&path, loops, conversation)?;
            }
        }

        Ok(last)
    }

    fn loop_temperature(&self) -> f32 {
        if self.spec.dynamic_temperature_enabled {
            rand::thread_rng().gen_range(0.0..1.0)
        } else {
            self.temperature
        }
    }

    fn complete_with_retry(&self, req: &ChatRequest) -> Result<String> {
        let attempts = self.spec.retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.provider.complete(req) {
                Ok(out) => return Ok(out),
                Err(err) => {
                    warn!(
                        agent = %self.spec.name,
                        attempt,
                        attempts,
                        error = %format!("{err:#}"),
                        "model call failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow!("no attempts were made"));
        Err(err.context(format!(
            "agent '{}' failed after {attempts} attempt(s)",
            self.spec.name
        )))
    }

    fn save(&self, path: &Path, loops: u32, conversation: Vec<ChatMessage>) -> Result<()> {
        let mut st = AgentState {
            agent_name: self.spec.name.clone(),
            user_name: self.spec.user_name.clone(),
            model: self.model.clone(),
            loops_completed: loops,
            conversation,
            updated_at_ms: 0,
        };
        st.touch();
        state::save_state(path, &st)?;
        debug!(agent = %self.spec.name, path = %path.display(), "agent state saved");
        Ok(())
    }
}
