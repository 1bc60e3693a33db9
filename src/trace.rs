use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a step sits in a run: which pass over the flow, which position in
/// it, and the agent at that position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub loop_idx: u32,
    pub position: usize,
    pub agent: String,
}

impl StepRef {
    pub fn new(loop_idx: u32, position: usize, agent: impl Into<String>) -> Self {
        Self {
            loop_idx,
            position,
            agent: agent.into(),
        }
    }

    /// Compact id, `<loop>.<position>.<agent>`.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.loop_idx, self.position, self.agent)
    }
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub swarm: String,
    pub flow: String,
    pub events: Vec<TraceEvent>,
    run_started_ms: u128,
    step_started_ms: HashMap<StepRef, u128>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    StepStarted {
        ts_ms: u128,
        step: StepRef,
    },
    /// The hand-off transcript the agent is about to receive.
    InputAssembled {
        ts_ms: u128,
        step: StepRef,
        input_hash: String,
        estimated_tokens: usize,
    },
    StepFinished {
        ts_ms: u128,
        step: StepRef,
        success: bool,
        elapsed_ms: u128,
    },
    RunFailed {
        ts_ms: u128,
        step: Option<StepRef>,
        message: String,
    },
    RunFinished {
        ts_ms: u128,
        success: bool,
        steps_completed: usize,
        elapsed_ms: u128,
    },
}

impl TraceEvent {
    pub fn summarize(&self) -> String {
        match self {
            TraceEvent::StepStarted { ts_ms, step } => format!(
                "{ts_ms} StepStarted step={step} loop={} pos={} agent={}",
                step.loop_idx, step.position, step.agent
            ),
            TraceEvent::InputAssembled {
                ts_ms,
                step,
                input_hash,
                estimated_tokens,
            } => format!(
                "{ts_ms} InputAssembled step={step} tokens~{estimated_tokens} hash={input_hash}"
            ),
            TraceEvent::StepFinished {
                ts_ms,
                step,
                success,
                elapsed_ms,
            } => {
                let elapsed = format_elapsed_ms(*elapsed_ms);
                format!("{ts_ms} StepFinished step={step} success={success} elapsed={elapsed}")
            }
            TraceEvent::RunFailed {
                ts_ms,
                step,
                message,
            } => match step {
                Some(step) => format!("{ts_ms} RunFailed step={step} message={message}"),
                None => format!("{ts_ms} RunFailed message={message}"),
            },
            TraceEvent::RunFinished {
                ts_ms,
                success,
                steps_completed,
                elapsed_ms,
            } => {
                let elapsed = format_elapsed_ms(*elapsed_ms);
                format!(
                    "{ts_ms} RunFinished success={success} steps={steps_completed} elapsed={elapsed}"
                )
            }
        }
    }
}

impl Trace {
    pub fn new(swarm: impl Into<String>, flow: impl Into<String>) -> Self {
        Self {
            swarm: swarm.into(),
            flow: flow.into(),
            events: Vec::new(),
            run_started_ms: now_ms(),
            step_started_ms: HashMap::new(),
        }
    }

    pub fn step_started(&mut self, step: &StepRef) {
        let ts_ms = now_ms();
        self.events.push(TraceEvent::StepStarted {
            ts_ms,
            step: step.clone(),
        });
        self.step_started_ms.insert(step.clone(), ts_ms);
    }

    pub fn input_assembled(&mut self, step: &StepRef, input_hash: &str, estimated_tokens: usize) {
        self.events.push(TraceEvent::InputAssembled {
            ts_ms: now_ms(),
            step: step.clone(),
            input_hash: input_hash.to_string(),
            estimated_tokens,
        });
    }

    pub fn step_finished(&mut self, step: &StepRef, success: bool) {
        let ts_ms = now_ms();
        let elapsed_ms = self
            .step_started_ms
            .remove(step)
            .map(|started| ts_ms.saturating_sub(started))
            .unwrap_or(0);
        self.events.push(TraceEvent::StepFinished {
            ts_ms,
            step: step.clone(),
            success,
            elapsed_ms,
        });
    }

    pub fn run_failed(&mut self, step: Option<&StepRef>, message: &str) {
        self.events.push(TraceEvent::RunFailed {
            ts_ms: now_ms(),
            step: step.cloned(),
            message: message.to_string(),
        });
    }

    pub fn run_finished(&mut self, success: bool) {
        let ts_ms = now_ms();
        let steps_completed = self
            .events
            .iter()
            .filter(|e| matches!(e, TraceEvent::StepFinished { success: true, .. }))
            .count();
        self.events.push(TraceEvent::RunFinished {
            ts_ms,
            success,
            steps_completed,
            elapsed_ms: ts_ms.saturating_sub(self.run_started_ms),
        });
    }

    /// Ids of started steps, in start order.
    pub fn started_steps(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::StepStarted { step, .. } => Some(step.id()),
                _ => None,
            })
            .collect()
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Print the run to stdout, one event per line.
pub fn print_trace(tr: &Trace) {
    println!("TRACE swarm={} flow={}", tr.swarm, tr.flow);
    for ev in &tr.events {
        println!("{}", ev.summarize());
    }
}

fn format_elapsed_ms(elapsed_ms: u128) -> String {
    let secs = elapsed_ms as f64 / 1000.0;
    format!("{secs:.2}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ref_id_carries_loop_position_and_agent() {
        let s = StepRef::new(1, 3, "Litigation-Support");
        assert_eq!(s.id(), "1.3.Litigation-Support");
    }

    #[test]
    fn step_events_pair_up_by_step() {
        let mut tr = Trace::new("legal", "A -> B");
        let a = StepRef::new(0, 0, "A");

        tr.step_started(&a);
        tr.input_assembled(&a, "abc", 12);
        tr.step_finished(&a, true);

        assert_eq!(tr.events.len(), 3);
        match &tr.events[1] {
            TraceEvent::InputAssembled {
                step,
                estimated_tokens,
                ..
            } => {
                assert_eq!(step, &a);
                assert_eq!(*estimated_tokens, 12);
            }
            other => panic!("expected InputAssembled, got {other:?}"),
        }
        match &tr.events[2] {
            TraceEvent::StepFinished {
                step,
                success,
                elapsed_ms,
                ..
            } => {
                assert_eq!(step.agent, "A");
                assert!(*success);
                assert!(*elapsed_ms <= 1_000);
            }
            other => panic!("expected StepFinished, got {other:?}"),
        }
    }

    #[test]
    fn run_finished_counts_successful_steps() {
        let mut tr = Trace::new("s", "A -> B");
        let a = StepRef::new(0, 0, "A");
        let b = StepRef::new(0, 1, "B");
        tr.step_started(&a);
        tr.step_finished(&a, true);
        tr.step_started(&b);
        tr.step_finished(&b, false);
        tr.run_failed(Some(&b), "boom");
        tr.run_finished(false);

        assert_eq!(tr.started_steps(), vec!["0.0.A", "0.1.B"]);
        assert!(tr.events[4]
            .summarize()
            .ends_with("RunFailed step=0.1.B message=boom"));
        assert!(matches!(
            tr.events[5],
            TraceEvent::RunFinished {
                success: false,
                steps_completed: 1,
                ..
            }
        ));
    }

    #[test]
    fn step_started_summary_names_loop_and_position() {
        let ev = TraceEvent::StepStarted {
            ts_ms: 7,
            step: StepRef::new(2, 4, "Corporate-Counsel"),
        };
        assert_eq!(
            ev.summarize(),
            "7 StepStarted step=2.4.Corporate-Counsel loop=2 pos=4 agent=Corporate-Counsel"
        );
    }

    #[test]
    fn elapsed_formats_with_two_decimals() {
        assert_eq!(format_elapsed_ms(1234), "1.23s");
        assert_eq!(format_elapsed_ms(0), "0.00s");
    }
}
