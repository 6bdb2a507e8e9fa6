//! Spindle CLI
//!
//! Command-line entry points for the trace debugger: syntax checking,
//! offline trace parsing, and running a model under the simulator.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use spindle_core::{RuntimeEvent, TraceItem};
use spindle_session::{
    DebugSession, LaunchConfig, Request, Response, SessionRequest, SyntaxChecker,
};
use spindle_trace::TraceParser;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;

#[derive(Parser)]
#[command(name = "spindle")]
#[command(about = "Time-travel debugger for SPIN simulation traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a model for syntax errors
    Check {
        /// Path to the model file
        file: PathBuf,
        /// Simulator executable
        #[arg(long, default_value = "spin")]
        simulator: String,
    },
    /// Parse a saved trace file and print its steps
    Parse {
        /// Path to the recorded trace
        trace: PathBuf,
        /// Print one JSON object per trace item instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run a model under the simulator and replay its trace to the end
    Run {
        /// Path to the model file
        file: PathBuf,
        /// Simulator executable
        #[arg(long, default_value = "spin")]
        simulator: String,
        /// Seed for the simulator's scheduling choices
        #[arg(long, default_value_t = 123)]
        seed: u32,
        /// Step budget handed to the simulator
        #[arg(long, default_value_t = 500)]
        step_limit: u32,
        /// Print raw simulator output for every step
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt().with_env_filter("spindle=info").init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { file, simulator } => check(file, simulator).await,
        Commands::Parse { trace, json } => parse(trace, json),
        Commands::Run { file, simulator, seed, step_limit, verbose } => {
            run(file, simulator, seed, step_limit, verbose).await
        }
    }
}

async fn check(file: PathBuf, simulator: String) -> Result<()> {
    let checker = SyntaxChecker::new(simulator);
    let diagnostics = checker.check(&file).await?;
    if diagnostics.is_empty() {
        println!("{}: no problems found", file.display());
        return Ok(());
    }
    for diagnostic in &diagnostics {
        println!("{}:{}: {}", diagnostic.file, diagnostic.line, diagnostic.message);
    }
    Err(eyre!("{} problems found", diagnostics.len()))
}

fn parse(trace: PathBuf, json: bool) -> Result<()> {
    let bytes = std::fs::read(&trace)?;
    let mut parser = TraceParser::new();
    let mut items = parser.feed(&bytes);
    items.extend(parser.finish());

    for item in &items {
        if json {
            println!("{}", serde_json::to_string(item)?);
            continue;
        }
        match item {
            TraceItem::Step(step) => println!(
                "{:>4}  proc {} ({}:{})  {}:{}  state {}",
                step.seq, step.proc, step.proc_name, step.proc_id, step.program, step.line,
                step.state
            ),
            TraceItem::Error(err) => {
                println!("error at {}:{}", err.program, err.line);
            }
        }
    }
    if !json {
        println!("{} trace items", items.len());
    }
    Ok(())
}

async fn run(
    file: PathBuf,
    simulator: String,
    seed: u32,
    step_limit: u32,
    verbose: bool,
) -> Result<()> {
    let (event_tx, mut events) = unbounded_channel();
    let session = DebugSession::new(event_tx);
    let (request_tx, request_rx) = unbounded_channel();
    tokio::spawn(session.run(request_rx));

    let config = LaunchConfig::new(file.display().to_string())
        .with_simulator(simulator)
        .with_seed(seed)
        .with_step_limit(step_limit)
        .with_verbose(verbose);
    if let Response::Error(message) = request(&request_tx, Request::Launch(config)).await? {
        return Err(eyre!(message));
    }

    let mut stops = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            RuntimeEvent::Output { text, .. } => print!("{}", text),
            RuntimeEvent::Stopped { reason, thread_id } => {
                stops += 1;
                println!("stopped: {:?} on thread {}", reason, thread_id);
                request(&request_tx, Request::Continue).await?;
            }
            RuntimeEvent::BreakpointChanged { .. } => {}
            RuntimeEvent::Ended => {
                println!("trace ended after {} stops", stops);
                break;
            }
        }
    }
    Ok(())
}

async fn request(
    requests: &UnboundedSender<SessionRequest>,
    request: Request,
) -> Result<Response> {
    let (reply, rx) = oneshot::channel();
    requests.send(SessionRequest { request, reply })?;
    Ok(rx.await?)
}
