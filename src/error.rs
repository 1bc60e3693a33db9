use thiserror::Error;

/// Problems with a flow expression or its agent references.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("flow expression is empty")]
    Empty,

    #[error("flow step {index} is empty in '{flow}'")]
    EmptyStep { index: usize, flow: String },

    #[error("flow step '{step}' branches; only linear flows are supported")]
    Branching { step: String },

    #[error("flow references unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("duplicate agent name '{0}'")]
    DuplicateAgent(String),
}

/// Failures talking to a model backend that callers may want to match on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("missing required credential env var '{0}'")]
    MissingCredential(String),

    #[error("{provider} provider returned non-success status {status}: {body}")]
    BadStatus {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} provider response missing '{field}'")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },

    #[error("{provider} provider timed out after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },
}

/// A selector that names neither the chain nor one of the specialists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent type '{0}'")]
pub struct UnknownAgentType(pub String);
