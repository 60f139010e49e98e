// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::c::ParseFailure;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions. Any of these aborts the run before a manifest is printed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("INVALID WITNESS FILE: {0}")]
    MalformedWitness(String),
    #[error("UNSUPPORTED WITNESS: {0}")]
    UnsupportedInput(String),
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
    #[error("failed to parse sanitized benchmark: {0}")]
    SourceParse(ParseFailure),
    #[error("failed to parse assumption `{substituted}` (original assumption: `{original}`): {failure}")]
    FragmentParse {
        original: String,
        substituted: String,
        failure: ParseFailure,
    },
    #[error("preprocessor failed: {0}")]
    Preprocessor(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedWitness(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedInput(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code used by the command line tool.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::MalformedWitness(_) => 1,
            Error::UnsupportedInput(_) => 2,
            Error::SourceParse(_) | Error::FragmentParse { .. } => 3,
            Error::Preprocessor(_) | Error::Io { .. } => 4,
            Error::InternalConsistency(_) => 70,
        }
    }

    /// Prints a source excerpt for parse failures to stderr. Other errors have nothing to show.
    pub fn report(&self) {
        match self {
            Error::SourceParse(failure) => failure.report("sanitized benchmark"),
            Error::FragmentParse { failure, .. } => failure.report("assumption"),
            _ => {}
        }
    }
}

/// Non-fatal findings. They are logged as they happen and never change the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    ProgramHashMismatch { declared: String, actual: String },
    NoViolationNode,
    NoInputValues,
    UndeclaredNondet(String),
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ProgramHashMismatch { declared, actual } => write!(
                f,
                "program hash mismatch: witness declares {declared}, benchmark hashes to {actual}"
            ),
            Warning::NoViolationNode => write!(f, "no violation node"),
            Warning::NoInputValues => write!(
                f,
                "no input values found in witness file, behaviour of harness may be undefined"
            ),
            Warning::UndeclaredNondet(name) => {
                write!(f, "`{name}` is called but never declared, skipping its value")
            }
        }
    }
}

/// Log target of [`Warning`]s. The command line tool keeps it enabled at any verbosity.
pub const WARNING_TARGET: &str = "witness2test::warning";

/// Warnings accumulated over one run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(target: WARNING_TARGET, "{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn contains(&self, warning: &Warning) -> bool {
        self.warnings.contains(warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_malformed_from_unsupported() {
        assert_eq!(Error::malformed("no entry node").exit_code(), 1);
        assert_eq!(Error::unsupported("correctness_witness").exit_code(), 2);
        assert_ne!(
            Error::InternalConsistency("x".to_string()).exit_code(),
            0
        );
    }

    #[test]
    fn malformed_message_prefix() {
        let e = Error::malformed("no entry node");
        assert_eq!(e.to_string(), "INVALID WITNESS FILE: no entry node");
    }

    #[test]
    fn diagnostics_collect_warnings() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::NoViolationNode);
        assert!(diag.contains(&Warning::NoViolationNode));
        assert_eq!(diag.warnings().len(), 1);
    }
}
