// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

pub mod c;
pub mod correlate;
pub mod decls;
pub mod error;
pub mod manifest;
pub mod witness;

pub use error::{Diagnostics, Error, Result, Warning};
pub use manifest::Manifest;

use crate::c::{CFrontend, TreeSitterFrontend};
use crate::decls::{DeclarationModel, WatchMap};
use crate::witness::{Automaton, LinearTrace};
use std::path::PathBuf;

/// Everything a single conversion run needs.
#[derive(Debug, Clone)]
pub struct Options {
    pub witness: PathBuf,
    pub benchmark: PathBuf,
    /// expected architecture width, `None` skips the check
    pub bitwidth: Option<u32>,
    pub preprocessor: String,
}

impl Options {
    pub fn new(witness: impl Into<PathBuf>, benchmark: impl Into<PathBuf>) -> Self {
        Self {
            witness: witness.into(),
            benchmark: benchmark.into(),
            bitwidth: None,
            preprocessor: c::DEFAULT_PREPROCESSOR.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub manifest: Manifest,
    pub diagnostics: Diagnostics,
}

/// Validated witness: the entry function plus the path to replay.
#[derive(Debug, Clone)]
pub struct ValidatedWitness {
    pub entry: String,
    pub trace: LinearTrace,
}

/// Reads, validates and linearizes a witness against the raw benchmark bytes.
pub fn load_witness(
    witness: &str,
    benchmark: &[u8],
    bitwidth: Option<u32>,
    diag: &mut Diagnostics,
) -> Result<ValidatedWitness> {
    let doc = witness::parse_witness(witness)?;
    let entry = doc.config.validate(benchmark, bitwidth, diag)?;
    let automaton = Automaton::build(&doc.nodes, &doc.edges, diag)?;
    let trace = automaton.linearize()?;
    tracing::info!(
        "witness for `{}` with {} edges on its path",
        entry.function,
        trace.len()
    );
    Ok(ValidatedWitness {
        entry: entry.function,
        trace,
    })
}

/// Converts the witness named in `options` into a test vector manifest.
pub fn process_witness(options: &Options) -> Result<Outcome> {
    let witness = std::fs::read(&options.witness).map_err(|e| Error::io(&options.witness, e))?;
    let witness = String::from_utf8(witness)
        .map_err(|e| Error::malformed(format!("witness is not valid UTF-8: {e}")))?;
    let benchmark =
        std::fs::read(&options.benchmark).map_err(|e| Error::io(&options.benchmark, e))?;
    let mut diagnostics = Diagnostics::default();
    let validated = load_witness(&witness, &benchmark, options.bitwidth, &mut diagnostics)?;

    tracing::info!("preprocessing {}", options.benchmark.display());
    let preprocessed = c::preprocess(&options.preprocessor, &options.benchmark)?;
    let manifest = process_preprocessed(
        &validated,
        &preprocessed,
        &options.benchmark.display().to_string(),
        &mut diagnostics,
    )?;
    Ok(Outcome {
        manifest,
        diagnostics,
    })
}

/// Everything after preprocessing: sanitize, parse, correlate and synthesize.
pub fn process_preprocessed(
    witness: &ValidatedWitness,
    preprocessed: &str,
    benchmark_name: &str,
    diag: &mut Diagnostics,
) -> Result<Manifest> {
    let sanitized = c::sanitize(preprocessed)?;
    let mut frontend = TreeSitterFrontend::new()?;
    let unit = frontend
        .parse_translation_unit(&sanitized)
        .map_err(Error::SourceParse)?;
    let decls = DeclarationModel::build(&unit, &witness.entry)?;
    let watch = WatchMap::build(&unit.calls)?;
    tracing::info!(
        "{} nondet declarations, {} watched lines",
        decls.nondets().count(),
        watch.len()
    );
    let correlation = correlate::correlate(&witness.trace, &decls, &watch, &mut frontend)?;
    Ok(Manifest::synthesize(
        benchmark_name,
        &decls,
        &watch,
        &correlation,
        diag,
    ))
}
