//! One-shot syntax checking through the simulator's analysis mode.
//!
//! Runs the simulator against a model file, scans its output for error
//! lines and republishes them as per-document diagnostics. The two failure
//! modes a user can actually fix — a missing executable and a simulator
//! that exits complaining on stderr — surface as distinct errors instead of
//! crashing the session.

use crate::error::CheckError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// `<file>:<line>: error: <msg>`
static PLAIN_ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+):([0-9]+): error: (.*)").expect("plain error pattern compiles"));

/// `spin: <file>:<line>, Error: <msg>`
static SPIN_ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"spin:\s*(.+):([0-9]+), Error: (.*)").expect("spin error pattern compiles")
});

/// One reported problem in a model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File the problem was reported in
    pub file: String,
    /// Line the problem was reported at (1-based)
    pub line: u32,
    /// Problem message
    pub message: String,
}

/// Syntax checker wrapping the simulator's analysis mode
#[derive(Debug, Clone)]
pub struct SyntaxChecker {
    simulator: String,
}

impl SyntaxChecker {
    /// Create a checker using the given simulator executable
    #[must_use]
    pub fn new(simulator: impl Into<String>) -> Self {
        Self { simulator: simulator.into() }
    }

    /// Run the simulator in analysis mode and collect diagnostics
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::SimulatorNotFound`] when the executable is
    /// missing and [`CheckError::SimulatorFailed`] when it exits nonzero
    /// with stderr output; a model with syntax errors is not a failure,
    /// its errors come back as diagnostics.
    pub async fn check(&self, file: &Path) -> Result<Vec<Diagnostic>, CheckError> {
        let output = Command::new(&self.simulator)
            .arg("-a")
            .arg(file)
            .current_dir(std::env::temp_dir())
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => {
                    CheckError::SimulatorNotFound { path: self.simulator.clone() }
                }
                _ => CheckError::Io { path: self.simulator.clone(), reason: err.to_string() },
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.trim().is_empty() {
            return Err(CheckError::SimulatorFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics = stdout
            .lines()
            .chain(stderr.lines())
            .filter_map(parse_diagnostic_line)
            .collect();
        Ok(diagnostics)
    }
}

/// Extract a diagnostic from one line of simulator output
///
/// Messages starting with "syntax error" fold to that fixed label.
fn parse_diagnostic_line(line: &str) -> Option<Diagnostic> {
    let caps = SPIN_ERROR_RE
        .captures(line)
        .or_else(|| PLAIN_ERROR_RE.captures(line))?;
    let message = caps[3].trim();
    let message = if message.starts_with("syntax error") {
        "syntax error".to_string()
    } else {
        message.to_string()
    };
    Some(Diagnostic {
        file: caps[1].trim().to_string(),
        line: caps[2].parse().ok()?,
        message,
    })
}

/// Per-document diagnostic sets
///
/// A new check replaces a document's whole set; closing the document
/// clears it.
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    by_document: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the diagnostic set for a document
    pub fn replace(&mut self, document: impl Into<PathBuf>, diagnostics: Vec<Diagnostic>) {
        self.by_document.insert(document.into(), diagnostics);
    }

    /// Drop the diagnostic set of a closed document
    pub fn clear(&mut self, document: &Path) {
        self.by_document.remove(document);
    }

    /// Current diagnostics for a document
    #[must_use]
    pub fn get(&self, document: &Path) -> &[Diagnostic] {
        self.by_document.get(document).map_or(&[], Vec::as_slice)
    }
}
