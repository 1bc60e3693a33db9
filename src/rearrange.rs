use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::FlowError;
use crate::flow::Flow;
use crate::prompt;
use crate::trace::{StepRef, Trace};

/// What `AgentRearrange::run` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// The whole labelled conversation, task first.
    #[default]
    All,
    /// Only the last agent's response.
    Final,
}

/// One entry in the hand-off transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: String,
    pub content: String,
}

/// Ordered hand-off transcript shared along the flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn push(&mut self, speaker: impl Into<String>, content: impl Into<String>) {
        self.turns.push(Turn {
            speaker: speaker.into(),
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_content(&self) -> Option<&str> {
        self.turns.last().map(|t| t.content.as_str())
    }

    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Runs a fixed set of agents in the order a linear flow names them.
#[derive(Debug, Clone)]
pub struct AgentRearrange {
    name: String,
    description: String,
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
    flow: Flow,
    max_loops: u32,
    verbose: bool,
    output: OutputType,
    user_name: String,
}

impl AgentRearrange {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        agents: Vec<Agent>,
        flow: Flow,
    ) -> Result<Self, FlowError> {
        let mut index = HashMap::new();
        let mut seen = HashSet::new();
        for (i, a) in agents.iter().enumerate() {
            if !seen.insert(a.name().to_string()) {
                return Err(FlowError::DuplicateAgent(a.name().to_string()));
            }
            index.insert(a.name().to_string(), i);
        }
        flow.validate(agents.iter().map(|a| a.name()))?;

        Ok(Self {
            name: name.into(),
            description: description.into(),
            agents,
            index,
            flow,
            max_loops: 1,
            verbose: false,
            output: OutputType::default(),
            user_name: "user".to_string(),
        })
    }

    pub fn with_max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops.max(1);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_output(mut self, output: OutputType) -> Self {
        self.output = output;
        self
    }

    /// Speaker label used for the task in the transcript.
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn max_loops(&self) -> u32 {
        self.max_loops
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    pub fn run(&self, task: &str) -> Result<String> {
        let mut tr = Trace::new(self.name.clone(), self.flow.to_string());
        self.run_traced(task, &mut tr)
    }

    /// Run the flow, recording step events in `tr`.
    pub fn run_traced(&self, task: &str, tr: &mut Trace) -> Result<String> {
        let mut conversation = Conversation::default();
        conversation.push(self.user_name.clone(), task);

        for loop_idx in 0..self.max_loops {
            for (pos, step) in self.flow.steps().iter().enumerate() {
                let step_ref = StepRef::new(loop_idx, pos, step.as_str());
                // Flow was validated against the agent set at construction.
                let Some(agent) = self.agent(step) else {
                    let err = FlowError::UnknownAgent(step.clone());
                    tr.run_failed(Some(&step_ref), &err.to_string());
                    tr.run_finished(false);
                    return Err(err.into());
                };

                let input = conversation.render();
                tr.step_started(&step_ref);
                tr.input_assembled(
                    &step_ref,
                    &prompt::hash_prompt(&input),
                    prompt::estimate_tokens(&input),
                );

                if self.verbose {
                    info!(swarm = %self.name, loop_idx, pos, agent = %agent.name(), "handing off");
                } else {
                    debug!(swarm = %self.name, loop_idx, pos, agent = %agent.name(), "handing off");
                }

                match agent
                    .run(&input)
                    .with_context(|| format!("flow step {pos} ('{step}') failed in '{}'", self.name))
                {
                    Ok(out) => {
                        tr.step_finished(&step_ref, true);
                        conversation.push(agent.name(), out);
                    }
                    Err(err) => {
                        tr.step_finished(&step_ref, false);
                        tr.run_failed(Some(&step_ref), &format!("{err:#}"));
                        tr.run_finished(false);
                        return Err(err);
                    }
                }
            }
        }

        tr.run_finished(true);
        Ok(match self.output {
            OutputType::All => conversation.render(),
            OutputType::Final => conversation.last_content().unwrap_or_default().to_string(),
        })
    }
}
