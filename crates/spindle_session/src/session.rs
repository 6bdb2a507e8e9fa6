//! The debug session gateway.
//!
//! Translates client operations into replay runtime calls and forwards the
//! runtime's events back to the client. One session is driven by exactly
//! one task: the only code that touches the runtime, selecting over client
//! requests and trace signals in arrival order. This serialization is what
//! upholds the snapshot-derivation invariants; transport framing around the
//! request/response/event surface is someone else's concern.

use crate::launcher::{self, LaunchConfig, TraceSignal};
use serde::{Deserialize, Serialize};
use spindle_core::{Breakpoint, RuntimeEvent, Thread, ThreadId, Variable};
use spindle_replay::{ReplayRuntime, StackTrace, VarScopeHandle};
use tokio::process::Child;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;

const fn default_levels() -> usize {
    10
}

/// Client operations accepted by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Interrogate session capabilities
    Initialize,
    /// Spawn the simulator and begin replaying its trace
    Launch(LaunchConfig),
    /// Replace the full breakpoint set for one source path
    SetBreakpoints {
        /// Source path
        path: String,
        /// Desired breakpoint lines
        lines: Vec<u32>,
    },
    /// List discovered threads
    Threads,
    /// Collect synthetic stack frames for a thread
    StackTrace {
        /// Thread selector; the main thread id selects all steps
        thread_id: ThreadId,
        /// First frame ordinal to return
        #[serde(default)]
        start_frame: usize,
        /// Maximum number of frames
        #[serde(default = "default_levels")]
        levels: usize,
    },
    /// Scope handles for a stack frame
    Scopes {
        /// Frame id from a stack query
        frame_id: i64,
    },
    /// Materialize one scope
    Variables {
        /// Scope handle from a scopes query
        handle: VarScopeHandle,
    },
    /// Run forward until a breakpoint, an error or the end
    Continue,
    /// Run backward until a breakpoint or the first step
    ReverseContinue,
    /// Stop at the next step
    Next,
    /// Stop at the next step
    StepIn,
    /// Stop at the next step
    StepOut,
    /// Stop at the previous step
    StepBack,
    /// Tear the session down
    Disconnect,
}

/// Replies produced by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Request accepted; completion arrives as an event if at all
    Ack,
    /// Capability flags reported to Initialize
    Capabilities {
        /// Whether configuration-done is understood
        supports_configuration_done: bool,
        /// Whether reverse navigation is available
        supports_step_back: bool,
    },
    /// Actual breakpoints registered by SetBreakpoints
    Breakpoints(Vec<Breakpoint>),
    /// Discovered threads
    Threads(Vec<Thread>),
    /// Collected stack frames
    StackTrace(StackTrace),
    /// The three scope handles of a frame
    Scopes {
        /// Process-local scope handle
        local: VarScopeHandle,
        /// Global scope handle
        global: VarScopeHandle,
        /// Message-queue scope handle
        queues: VarScopeHandle,
    },
    /// Materialized scope contents
    Variables(Vec<Variable>),
    /// The request failed; the session did not start
    Error(String),
}

/// One request paired with its reply channel
#[derive(Debug)]
pub struct SessionRequest {
    /// The client operation
    pub request: Request,
    /// Where the response goes
    pub reply: oneshot::Sender<Response>,
}

/// A debug session: the replay runtime plus its collaborator wiring
pub struct DebugSession {
    runtime: ReplayRuntime,
    child: Option<Child>,
    trace: Option<UnboundedReceiver<TraceSignal>>,
    runtime_events: UnboundedReceiver<RuntimeEvent>,
    client_events: UnboundedSender<RuntimeEvent>,
    trace_logging: bool,
}

impl DebugSession {
    /// Create a session that reports events through `client_events`
    #[must_use]
    pub fn new(client_events: UnboundedSender<RuntimeEvent>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            runtime: ReplayRuntime::new(tx),
            child: None,
            trace: None,
            runtime_events: rx,
            client_events,
            trace_logging: false,
        }
    }

    /// Wire a pre-produced trace source into the session and start replaying
    ///
    /// Used for replaying saved traces without a simulator process; Launch
    /// goes through the same path after spawning one.
    pub fn attach(
        &mut self,
        signals: UnboundedReceiver<TraceSignal>,
        stop_on_entry: bool,
        verbose: bool,
    ) {
        self.trace = Some(signals);
        self.runtime.start(stop_on_entry, verbose);
    }

    /// Translate one client operation into runtime calls
    pub fn handle_request(&mut self, request: Request) -> Response {
        if self.trace_logging {
            tracing::info!("request: {:?}", request);
        }
        match request {
            Request::Initialize => Response::Capabilities {
                supports_configuration_done: true,
                supports_step_back: true,
            },
            Request::Launch(config) => match launcher::launch(&config) {
                Ok(simulator) => {
                    self.trace_logging = config.trace_logging;
                    self.child = Some(simulator.child);
                    self.attach(simulator.signals, config.stop_on_entry, config.verbose);
                    Response::Ack
                }
                Err(err) => Response::Error(err.to_string()),
            },
            Request::SetBreakpoints { path, lines } => {
                self.runtime.clear_breakpoints(&path);
                let breakpoints = lines
                    .iter()
                    .map(|&line| self.runtime.set_breakpoint(&path, line))
                    .collect();
                Response::Breakpoints(breakpoints)
            }
            Request::Threads => Response::Threads(self.runtime.threads()),
            Request::StackTrace { thread_id, start_frame, levels } => Response::StackTrace(
                self.runtime.stack_trace(start_frame, start_frame + levels, thread_id),
            ),
            Request::Scopes { frame_id } => {
                let set = self.runtime.scopes(frame_id);
                Response::Scopes { local: set.local, global: set.global, queues: set.queues }
            }
            Request::Variables { handle } => {
                Response::Variables(self.runtime.variables(handle))
            }
            Request::Continue => {
                self.runtime.continue_run(false);
                Response::Ack
            }
            Request::ReverseContinue => {
                self.runtime.continue_run(true);
                Response::Ack
            }
            Request::Next | Request::StepIn | Request::StepOut => {
                self.runtime.step(false);
                Response::Ack
            }
            Request::StepBack => {
                self.runtime.step(true);
                Response::Ack
            }
            Request::Disconnect => {
                self.kill_simulator();
                Response::Ack
            }
        }
    }

    /// Drive the session until the client disconnects
    ///
    /// Requests, trace signals and runtime events are consumed in arrival
    /// order from this single task; event forwarding preserves the FIFO
    /// order the runtime emitted them in.
    pub async fn run(mut self, mut requests: UnboundedReceiver<SessionRequest>) {
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(SessionRequest { request, reply }) = request else {
                        break;
                    };
                    let disconnect = matches!(request, Request::Disconnect);
                    let response = self.handle_request(request);
                    let _ = reply.send(response);
                    if disconnect {
                        break;
                    }
                }
                signal = recv_trace(&mut self.trace) => {
                    match signal {
                        Some(TraceSignal::Item(item)) => self.runtime.accept(item),
                        Some(TraceSignal::Ended) => self.runtime.finish_trace(),
                        None => self.trace = None,
                    }
                }
                event = self.runtime_events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if event.is_terminal() {
                        self.kill_simulator();
                    }
                    if self.client_events.send(event).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("debug session finished");
    }

    fn kill_simulator(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Receive the next trace signal, or park forever when no source is wired
async fn recv_trace(trace: &mut Option<UnboundedReceiver<TraceSignal>>) -> Option<TraceSignal> {
    match trace {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
