use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use legal_swarm::config::SwarmConfig;
use legal_swarm::install::Installer;
use legal_swarm::legal::{AgentType, LegalSwarm, INVALID_AGENT_TYPE, SAMPLE_TASK};
use legal_swarm::provider::{self, ChatMessage};
use legal_swarm::translate::{self, TargetLanguage};
use legal_swarm::{analysis, chat, plan, server, trace};

/// Multi-agent legal assistant: five specialists chained in a fixed flow.
///
/// With no subcommand, runs a fixed demonstration task through the whole chain.
#[derive(Parser, Debug)]
#[command(name = "legal-swarm", version)]
#[command(about = "Sequential multi-agent legal assistant", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a task to the whole chain or to one specialist
    Run {
        task: String,

        /// swarm, contract, research, compliance, litigation or corporate
        #[arg(long, default_value = "swarm")]
        agent: String,

        /// Print step events after the run
        #[arg(long)]
        trace: bool,
    },

    /// Print the agents and flow without calling any model
    Plan,

    /// Run the configured install command once
    Install,

    /// Serve the JSON API
    Serve {
        /// Overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ask the general legal assistant one question
    Chat { message: String },

    /// Translate text (zh for Simplified Chinese, anything else for English)
    Translate {
        text: String,

        #[arg(long, default_value = "en")]
        to: String,
    },

    /// Produce a structured analysis of a document file
    Analyze { path: PathBuf },
}

fn print_error_chain(err: &anyhow::Error) {
    eprintln!("Error: {err}");

    let mut n = 0;
    let mut cur = err.source();
    while let Some(cause) = cur {
        eprintln!("  {n}: {cause}");
        n += 1;
        cur = cause.source();
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match real_main(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error_chain(&err);
            std::process::exit(1);
        }
    }
}

fn real_main(cli: Cli) -> Result<i32> {
    let config = SwarmConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        None => {
            let swarm = LegalSwarm::from_config(&config)?;
            println!("🔍 Running Legal Assistant Swarm...");
            println!("Task: {SAMPLE_TASK}");
            println!("{}", "-".repeat(50));
            let result = swarm.run(SAMPLE_TASK, AgentType::Swarm)?;
            println!("Result: {result}");
        }
        Some(Command::Run { task, agent, trace }) => {
            let swarm = LegalSwarm::from_config(&config)?;
            let Ok(agent_type) = agent.parse::<AgentType>() else {
                println!("{INVALID_AGENT_TYPE}");
                return Ok(0);
            };
            let mut tr = trace::Trace::new(swarm.swarm().name(), swarm.flow().to_string());
            let result = swarm.run_traced(&task, agent_type, &mut tr);
            if trace {
                trace::print_trace(&tr);
            }
            println!("{}", result?.trim_end());
        }
        Some(Command::Plan) => {
            let swarm = LegalSwarm::from_config(&config)?;
            plan::print_plan(swarm.swarm());
        }
        Some(Command::Install) => {
            let installer = Installer::from_config(&config.install)?;
            if !installer.install() {
                return Ok(1);
            }
        }
        Some(Command::Serve { bind }) => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = server::ApiState::from_config(&config)?;
            server::run_server(&bind, &state)?;
        }
        Some(Command::Chat { message }) => {
            let provider = provider::build_provider(&config.model)?;
            let reply = chat::chat(
                provider.as_ref(),
                &config.model,
                &[ChatMessage::user(message)],
            )?;
            println!("{}", reply.trim_end());
        }
        Some(Command::Translate { text, to }) => {
            let provider = provider::build_provider(&config.model)?;
            let out = translate::translate(
                provider.as_ref(),
                &config.model,
                &text,
                TargetLanguage::from_code(&to),
            )?;
            println!("{out}");
        }
        Some(Command::Analyze { path }) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read document '{}'", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let provider = provider::build_provider(&config.model)?;
            let result =
                analysis::analyze_document(provider.as_ref(), &config.model, &text, &file_name)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(0)
}
