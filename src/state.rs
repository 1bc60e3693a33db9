use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::provider::ChatMessage;

/// What an agent persists after a run when `autosave` is on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub agent_name: String,
    pub user_name: String,
    pub model: String,
    pub loops_completed: u32,
    pub conversation: Vec<ChatMessage>,
    pub updated_at_ms: u64,
}

impl AgentState {
    pub fn touch(&mut self) {
        self.updated_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
    }
}

/// Write `state` as pretty JSON. The file is replaced atomically.
pub fn save_state(path: &Path, state: &AgentState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory '{}'", parent.display())
            })?;
        }
    }

    let json = serde_json::to_vec_pretty(state).context("serialize agent state")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    fs::write(tmp, &json)
        .with_context(|| format!("failed to write agent state '{}'", tmp.display()))?;
    fs::rename(tmp, path)
        .with_context(|| format!("failed to move agent state into '{}'", path.display()))?;
    Ok(())
}

pub fn load_state(path: &Path) -> Result<AgentState> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read agent state '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("agent state is not valid JSON: '{}'", path.display()))
}
