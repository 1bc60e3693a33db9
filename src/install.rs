use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::InstallConfig;

/// Provisions the external dependency the runtime needs, once, with no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
    label: String,
    program: String,
    args: Vec<String>,
}

impl Installer {
    pub fn new(label: impl Into<String>, command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("install command is empty"))?;
        Ok(Self {
            label: label.into(),
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn from_config(cfg: &InstallConfig) -> Result<Self> {
        Self::new(cfg.label.clone(), &cfg.command)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the install command. Prints one status line; true iff it succeeded.
    pub fn install(&self) -> bool {
        match self.run_command() {
            Ok(()) => {
                println!("✅ {} installed successfully!", self.label);
                true
            }
            Err(err) => {
                println!("❌ Error installing {}: {err:#}", self.label);
                false
            }
        }
    }

    fn run_command(&self) -> Result<()> {
        debug!(program = %self.program, args = ?self.args, "running install command");
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("failed to spawn `{}`", self.program))?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "command `{}` returned non-zero exit status {:?}",
                self.command_line(),
                status.code()
            ))
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
