//! Spindle Session Layer
//!
//! The collaborators around the replay core: the process launcher that
//! spawns the simulator and streams its output into the trace parser, the
//! debug session gateway that maps client requests onto replay runtime
//! operations, and the one-shot syntax checker that republishes simulator
//! diagnostics as per-document error markers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod check;
pub mod error;
pub mod launcher;
pub mod session;

pub use check::{Diagnostic, DiagnosticStore, SyntaxChecker};
pub use error::{CheckError, SessionError};
pub use launcher::{LaunchConfig, LaunchedSimulator, TraceSignal, launch};
pub use session::{DebugSession, Request, Response, SessionRequest};
