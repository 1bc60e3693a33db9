//! The legal assistant swarm: five specialist agents chained in a fixed flow,
//! plus the selector-based dispatcher in front of them.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::agent::{Agent, AgentSpec};
use crate::config::SwarmConfig;
use crate::error::UnknownAgentType;
use crate::flow::Flow;
use crate::prompt;
use crate::provider::{self, Provider};
use crate::rearrange::AgentRearrange;
use crate::trace::{StepRef, Trace};

/// Returned (not raised) when the selector names no agent.
pub const INVALID_AGENT_TYPE: &str = "Invalid agent type specified";

pub const SAMPLE_TASK: &str =
    "Analyze the key risks in a software licensing agreement for a SaaS company";

pub const SWARM_NAME: &str = "Legal-Assistant-Swarm";
pub const SWARM_DESCRIPTION: &str = "A coordinated swarm of specialized legal agents";
pub const USER_NAME: &str = "legal_user";

pub const CONTRACT_AGENT: &str = "Contract-Analyzer";
pub const RESEARCH_AGENT: &str = "Legal-Researcher";
pub const COMPLIANCE_AGENT: &str = "Compliance-Specialist";
pub const LITIGATION_AGENT: &str = "Litigation-Support";
pub const CORPORATE_AGENT: &str = "Corporate-Counsel";

const CONTRACT_PROMPT: &str = "You are a specialized contract analysis agent with expertise in:
- Contract review and analysis
- Risk assessment and identification
- Clause interpretation and recommendations
- Compliance verification
- Terms and conditions evaluation

Provide detailed, professional analysis with specific recommendations for contract improvements or concerns.";

const RESEARCH_PROMPT: &str = "You are a specialized legal research agent with expertise in:
- Case law research and analysis
- Statute and regulation interpretation
- Legal precedent identification
- Jurisdiction-specific legal guidance
- Citation and reference verification

Provide comprehensive legal research with proper citations and relevant case law references.";

const COMPLIANCE_PROMPT: &str = "You are a specialized compliance agent with expertise in:
- Regulatory compliance assessment
- Industry-specific regulations (GDPR, HIPAA, SOX, etc.)
- Risk management and mitigation
- Audit preparation and documentation
- Policy development and review

Provide detailed compliance analysis with actionable recommendations for regulatory adherence.";

const LITIGATION_PROMPT: &str = "You are a specialized litigation support agent with expertise in:
- Case strategy development
- Evidence analysis and organization
- Discovery planning and management
- Legal brief preparation assistance
- Settlement negotiation guidance

Provide strategic litigation support with detailed analysis and actionable recommendations.";

const CORPORATE_PROMPT: &str = "You are a specialized corporate law agent with expertise in:
- Corporate governance and structure
- Mergers and acquisitions
- Securities law and compliance
- Employment law and HR policies
- Intellectual property protection

Provide comprehensive corporate legal guidance with business-focused recommendations.";

/// Which agent (or the whole chain) a task is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    Swarm,
    Contract,
    Research,
    Compliance,
    Litigation,
    Corporate,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Swarm,
        AgentType::Contract,
        AgentType::Research,
        AgentType::Compliance,
        AgentType::Litigation,
        AgentType::Corporate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Swarm => "swarm",
            AgentType::Contract => "contract",
            AgentType::Research => "research",
            AgentType::Compliance => "compliance",
            AgentType::Litigation => "litigation",
            AgentType::Corporate => "corporate",
        }
    }

    /// Name of the single agent this selector targets; `None` for the chain.
    pub fn agent_name(&self) -> Option<&'static str> {
        match self {
            AgentType::Swarm => None,
            AgentType::Contract => Some(CONTRACT_AGENT),
            AgentType::Research => Some(RESEARCH_AGENT),
            AgentType::Compliance => Some(COMPLIANCE_AGENT),
            AgentType::Litigation => Some(LITIGATION_AGENT),
            AgentType::Corporate => Some(CORPORATE_AGENT),
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = UnknownAgentType;

    /// Exact, case-sensitive match on the six selector literals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownAgentType(s.to_string()))
    }
}

/// Descriptors for the five specialists, in flow order.
pub fn agent_specs() -> Vec<AgentSpec> {
    [
        (CONTRACT_AGENT, CONTRACT_PROMPT, "contract_agent.json"),
        (RESEARCH_AGENT, RESEARCH_PROMPT, "research_agent.json"),
        (COMPLIANCE_AGENT, COMPLIANCE_PROMPT, "compliance_agent.json"),
        (LITIGATION_AGENT, LITIGATION_PROMPT, "litigation_agent.json"),
        (CORPORATE_AGENT, CORPORATE_PROMPT, "corporate_agent.json"),
    ]
    .into_iter()
    .map(|(name, prompt, state)| AgentSpec {
        max_loops: 1,
        autosave: true,
        dashboard: false,
        verbose: true,
        dynamic_temperature_enabled: true,
        saved_state_path: Some(PathBuf::from(state)),
        user_name: USER_NAME.to_string(),
        retry_attempts: 1,
        context_length: 200_000,
        ..AgentSpec::new(name, prompt)
    })
    .collect()
}

/// The five agents and the pipeline over them, built once and shared.
#[derive(Debug, Clone)]
pub struct LegalSwarm {
    swarm: AgentRearrange,
}

impl LegalSwarm {
    /// Build with the provider selected by `config.model`.
    pub fn from_config(config: &SwarmConfig) -> Result<Self> {
        let provider =
            provider::build_provider(&config.model).context("failed to build model provider")?;
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: &SwarmConfig, provider: Arc<dyn Provider>) -> Result<Self> {
        let agents: Vec<Agent> = agent_specs()
            .into_iter()
            .map(|spec| Agent::new(spec, &config.model, provider.clone(), &config.state_dir))
            .collect();

        let flow = Flow::from_agents(agents.iter().map(|a| a.name()))?;
        let swarm = AgentRearrange::new(SWARM_NAME, SWARM_DESCRIPTION, agents, flow)?
            .with_max_loops(1)
            .with_verbose(true)
            .with_user_name(USER_NAME);

        Ok(Self { swarm })
    }

    pub fn swarm(&self) -> &AgentRearrange {
        &self.swarm
    }

    pub fn flow(&self) -> &Flow {
        self.swarm.flow()
    }

    pub fn agent(&self, agent_type: AgentType) -> Option<&Agent> {
        agent_type.agent_name().and_then(|n| self.swarm.agent(n))
    }

    /// Send `task` to the chain (`"swarm"`) or to one specialist.
    ///
    /// Unknown selectors return [`INVALID_AGENT_TYPE`] rather than an error;
    /// model failures propagate.
    pub fn run_legal_swarm(&self, task: &str, agent_type: &str) -> Result<String> {
        match agent_type.parse::<AgentType>() {
            Ok(t) => self.run(task, t),
            Err(_) => Ok(INVALID_AGENT_TYPE.to_string()),
        }
    }

    pub fn run(&self, task: &str, agent_type: AgentType) -> Result<String> {
        let mut tr = Trace::new(self.swarm.name(), self.swarm.flow().to_string());
        self.run_traced(task, agent_type, &mut tr)
    }

    pub fn run_traced(&self, task: &str, agent_type: AgentType, tr: &mut Trace) -> Result<String> {
        match agent_type.agent_name() {
            None => self.swarm.run_traced(task, tr),
            Some(name) => {
                let agent = self
                    .swarm
                    .agent(name)
                    .with_context(|| format!("agent '{name}' is not part of the swarm"))?;
                // Keep the agent's flow position so single runs line up with chain traces.
                let position = self
                    .flow()
                    .steps()
                    .iter()
                    .position(|s| s == name)
                    .unwrap_or(0);
                let step_ref = StepRef::new(0, position, name);
                tr.step_started(&step_ref);
                tr.input_assembled(
                    &step_ref,
                    &prompt::hash_prompt(task),
                    prompt::estimate_tokens(task),
                );
                let res = agent.run(task);
                tr.step_finished(&step_ref, res.is_ok());
                if let Err(err) = &res {
                    tr.run_failed(Some(&step_ref), &format!("{err:#}"));
                }
                tr.run_finished(res.is_ok());
                res
            }
        }
    }
}
