//! Flow expressions: the textual, left-to-right order agents run in.

use std::collections::HashSet;
use std::fmt;

use crate::error::FlowError;

/// Separator between consecutive agents in a flow expression.
pub const FLOW_ARROW: &str = " -> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    steps: Vec<String>,
}

impl Flow {
    /// Flow that visits `names` in the given order.
    pub fn from_agents<I, S>(names: I) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let steps: Vec<String> = names
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        if steps.is_empty() {
            return Err(FlowError::Empty);
        }
        let flow = Self { steps };
        flow.check_steps()?;
        Ok(flow)
    }

    /// Parse `"A -> B -> C"`. Whitespace around names is ignored.
    pub fn parse(expr: &str) -> Result<Self, FlowError> {
        if expr.trim().is_empty() {
            return Err(FlowError::Empty);
        }
        let steps: Vec<String> = expr.split("->").map(|s| s.trim().to_string()).collect();
        let flow = Self { steps };
        flow.check_steps().map_err(|err| match err {
            FlowError::EmptyStep { index, .. } => FlowError::EmptyStep {
                index,
                flow: expr.to_string(),
            },
            other => other,
        })?;
        Ok(flow)
    }

    fn check_steps(&self) -> Result<(), FlowError> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.is_empty() {
                return Err(FlowError::EmptyStep {
                    index,
                    flow: self.to_string(),
                });
            }
            if step.contains(',') {
                return Err(FlowError::Branching { step: step.clone() });
            }
        }
        Ok(())
    }

    /// Every step must name one of `known`.
    pub fn validate<'a, I>(&self, known: I) -> Result<(), FlowError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let known: HashSet<&str> = known.into_iter().collect();
        match self.steps.iter().find(|s| !known.contains(s.as_str())) {
            Some(missing) => Err(FlowError::UnknownAgent(missing.clone())),
            None => Ok(()),
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.steps.join(FLOW_ARROW))
    }
}

impl std::str::FromStr for Flow {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flow::parse(s)
    }
}
