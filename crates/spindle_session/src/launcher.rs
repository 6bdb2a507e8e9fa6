//! Spawning the simulator and streaming its output into the parser.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use spindle_core::TraceItem;
use spindle_trace::TraceParser;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

fn default_simulator() -> String {
    "spin".to_string()
}

const fn default_seed() -> u32 {
    123
}

const fn default_step_limit() -> u32 {
    500
}

/// Launch configuration for one simulator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Path of the model to simulate
    pub program: String,
    /// Simulator executable
    #[serde(default = "default_simulator")]
    pub simulator: String,
    /// Seed for the simulator's scheduling choices
    #[serde(default = "default_seed")]
    pub seed: u32,
    /// Step budget handed to the simulator
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,
    /// Stop at the first step instead of free-running
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Report raw simulator output for every step
    #[serde(default)]
    pub verbose: bool,
    /// Log the gateway's request traffic
    #[serde(default)]
    pub trace_logging: bool,
}

impl LaunchConfig {
    /// Create a config with the default simulator, seed and step limit
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            simulator: default_simulator(),
            seed: default_seed(),
            step_limit: default_step_limit(),
            stop_on_entry: false,
            verbose: false,
            trace_logging: false,
        }
    }

    /// Set the simulator executable
    #[must_use]
    pub fn with_simulator(mut self, simulator: impl Into<String>) -> Self {
        self.simulator = simulator.into();
        self
    }

    /// Set the scheduling seed
    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Set the step budget
    #[must_use]
    pub fn with_step_limit(mut self, step_limit: u32) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Stop at the first step
    #[must_use]
    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }

    /// Report raw output for every step
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Log gateway request traffic
    #[must_use]
    pub fn with_trace_logging(mut self, trace_logging: bool) -> Self {
        self.trace_logging = trace_logging;
        self
    }

    /// Argument vector handed to the simulator
    #[must_use]
    pub fn simulator_args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            "-s".to_string(),
            "-r".to_string(),
            "-X".to_string(),
            "-v".to_string(),
            format!("-n{}", self.seed),
            "-l".to_string(),
            "-g".to_string(),
            format!("-u{}", self.step_limit),
            self.program.clone(),
        ]
    }
}

/// Signal delivered by the reader task feeding a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceSignal {
    /// A trace item completed by newly read output
    Item(TraceItem),
    /// The trace is over; no further items will arrive
    Ended,
}

/// A spawned simulator with its output wired into a trace parser
#[derive(Debug)]
pub struct LaunchedSimulator {
    /// Handle to the simulator process; killing it ends the session
    pub child: Child,
    /// Trace signals produced by the reader task
    pub signals: UnboundedReceiver<TraceSignal>,
}

/// Spawn the simulator and start streaming its stdout into a parser
///
/// The reader task runs until the parser closes itself or the process
/// output ends, then delivers [`TraceSignal::Ended`].
///
/// # Errors
///
/// Returns [`SessionError::SimulatorNotFound`] when the executable is
/// missing and [`SessionError::LaunchFailed`] for any other spawn failure.
/// Both occur before any step is produced; the session never starts.
pub fn launch(config: &LaunchConfig) -> Result<LaunchedSimulator, SessionError> {
    let args = config.simulator_args();
    tracing::info!("launching {} {}", config.simulator, args.join(" "));

    let mut child = Command::new(&config.simulator)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                SessionError::SimulatorNotFound { path: config.simulator.clone() }
            }
            _ => SessionError::LaunchFailed {
                path: config.simulator.clone(),
                reason: err.to_string(),
            },
        })?;

    let stdout = child.stdout.take().expect("simulator stdout is piped");
    let (tx, rx) = unbounded_channel();
    tokio::spawn(pump_trace(stdout, tx));

    Ok(LaunchedSimulator { child, signals: rx })
}

/// Read simulator output in chunks and forward completed trace items
async fn pump_trace(mut stdout: ChildStdout, tx: UnboundedSender<TraceSignal>) {
    let mut parser = TraceParser::new();
    let mut buf = [0u8; 4096];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for item in parser.feed(&buf[..n]) {
                    if tx.send(TraceSignal::Item(item)).is_err() {
                        return;
                    }
                }
                if parser.is_closed() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!("reading simulator output failed: {}", err);
                break;
            }
        }
    }
    for item in parser.finish() {
        if tx.send(TraceSignal::Item(item)).is_err() {
            return;
        }
    }
    let _ = tx.send(TraceSignal::Ended);
}
