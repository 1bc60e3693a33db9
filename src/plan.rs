use crate::rearrange::AgentRearrange;

/// Render the pipeline: name, description, flow, then one line per step.
pub fn render_plan(swarm: &AgentRearrange) -> String {
    let mut out = vec![
        format!("Swarm:        {}", swarm.name()),
        format!("Description:  {}", swarm.description()),
        format!("Flow:         {}", swarm.flow()),
        format!("Loops:        {}", swarm.max_loops()),
        format!("Steps:        {}", swarm.flow().len()),
    ];

    for (idx, step) in swarm.flow().steps().iter().enumerate() {
        let line = match swarm.agent(step) {
            Some(agent) => {
                let spec = agent.spec();
                let state = spec
                    .saved_state_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "  {idx}. {step}  model={} loops={} retries={} state={state}",
                    agent.model(),
                    spec.max_loops,
                    spec.retry_attempts
                )
            }
            None => format!("  {idx}. {step}  <unresolved-agent>"),
        };
        out.push(line);
    }
    out.join("\n")
}

pub fn print_plan(swarm: &AgentRearrange) {
    println!("{}", render_plan(swarm));
}
