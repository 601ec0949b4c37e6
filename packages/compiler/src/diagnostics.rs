//! Diagnostic kinds, the shared diagnostics sink and user-visible formatting.
//!
//! Recoverable errors (lexical, scan, parse, resolution) accumulate in a
//! [`DiagnosticsSink`] threaded through the pipeline so that report order
//! follows discovery order. Fatal conditions (module, generation, timeout,
//! I/O) short-circuit as [`FatalError`] at the next phase boundary.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse_util::{ParseError, ParseErrorLevel, ParseSourceSpan};

/// Pipeline phase, attached to timeout errors and `--debug` diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    PreScan,
    ModuleLoad,
    Scan,
    Dispatch,
    Resolve,
    Generate,
    Merge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreScan => "pre-scan",
            Phase::ModuleLoad => "module-load",
            Phase::Scan => "scan",
            Phase::Dispatch => "dispatch",
            Phase::Resolve => "resolve",
            Phase::Generate => "generate",
            Phase::Merge => "merge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Lexical,
    Scan,
    Parse,
    Resolution,
    Module,
    Generation,
    Timeout,
    Io,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Lexical => "lexical error",
            DiagnosticKind::Scan => "scan error",
            DiagnosticKind::Parse => "parse error",
            DiagnosticKind::Resolution => "resolution error",
            DiagnosticKind::Module => "module error",
            DiagnosticKind::Generation => "generation error",
            DiagnosticKind::Timeout => "timeout error",
            DiagnosticKind::Io => "io error",
        };
        f.write_str(name)
    }
}

/// A single reported problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub msg: String,
    pub span: Option<ParseSourceSpan>,
    pub level: ParseErrorLevel,
    pub phase: Option<Phase>,
    pub component: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, msg: String, span: Option<ParseSourceSpan>) -> Self {
        Diagnostic {
            kind,
            msg,
            span,
            level: ParseErrorLevel::Error,
            phase: None,
            component: None,
        }
    }

    pub fn in_phase(mut self, phase: Phase, component: &str) -> Self {
        self.phase = Some(phase);
        self.component = Some(component.to_string());
        self
    }

    /// `<file>:<line>:<column>: <kind>: <message>`, with the phase and
    /// component appended in debug mode.
    pub fn format(&self, debug: bool) -> String {
        let mut out = String::new();
        if let Some(span) = &self.span {
            out.push_str(&span.start.display());
            out.push_str(": ");
        }
        out.push_str(&format!("{}: {}", self.kind, self.msg));
        if debug {
            if let (Some(phase), Some(component)) = (&self.phase, &self.component) {
                out.push_str(&format!(" [{}/{}]", phase, component));
            }
        }
        out
    }
}

/// Ordered collection of diagnostics, shared by every pipeline component of a
/// single compilation unit. Interior mutability keeps the sink passable by
/// shared reference through the visitor-shaped call graph.
#[derive(Debug, Default)]
pub struct DiagnosticsSink {
    entries: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticsSink {
    pub fn new() -> Self {
        DiagnosticsSink::default()
    }

    pub fn report(&self, diag: Diagnostic) {
        log::debug!("diagnostic: {}", diag.format(true));
        self.entries.borrow_mut().push(diag);
    }

    pub fn report_parse_error(&self, kind: DiagnosticKind, err: ParseError) {
        let mut diag = Diagnostic::new(kind, err.contextual_message(), Some(err.span));
        diag.level = err.level;
        self.report(diag);
    }

    pub fn error(&self, kind: DiagnosticKind, msg: impl Into<String>, span: Option<ParseSourceSpan>) {
        self.report(Diagnostic::new(kind, msg.into(), span));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|d| d.level == ParseErrorLevel::Error)
            .count()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// One line per diagnostic, followed by a summary count.
    pub fn format_all(&self, debug: bool) -> String {
        let entries = self.entries.borrow();
        let mut out = String::new();
        for diag in entries.iter() {
            out.push_str(&diag.format(debug));
            out.push('\n');
        }
        let errors = entries
            .iter()
            .filter(|d| d.level == ParseErrorLevel::Error)
            .count();
        let warnings = entries.len() - errors;
        if warnings > 0 {
            out.push_str(&format!("{} error(s), {} warning(s)\n", errors, warnings));
        } else {
            out.push_str(&format!("{} error(s)\n", errors));
        }
        out
    }
}

/// Errors that abort the compilation unit at the next phase boundary.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("module error: {0}")]
    Module(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("timeout error: compilation exceeded its deadline during {phase}")]
    Timeout { phase: Phase },

    #[error("io error: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FatalError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        FatalError::Io { path: path.into(), source }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            FatalError::Module(_) => DiagnosticKind::Module,
            FatalError::Generation(_) => DiagnosticKind::Generation,
            FatalError::Timeout { .. } => DiagnosticKind::Timeout,
            FatalError::Io { .. } => DiagnosticKind::Io,
        }
    }
}

pub type FatalResult<T> = Result<T, FatalError>;
