//! Spindle Trace Parser
//!
//! Incremental, line-oriented parsing of raw simulator output into
//! structured step records. One parser instance consumes one trace,
//! delivered in arbitrarily sized chunks; its output depends only on the
//! logical concatenation of the bytes it was fed, never on where the
//! chunk boundaries fell.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod parser;

pub use parser::TraceParser;
