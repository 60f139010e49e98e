// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;

pub const DEFAULT_PREPROCESSOR: &str = "gcc";

/// Runs the system C preprocessor on `benchmark` and returns its output.
///
/// GNU attributes are defined away on the command line. The output goes through a temporary
/// file that is deleted when this function returns, no matter how.
pub fn preprocess(program: &str, benchmark: &Path) -> Result<String> {
    let out = tempfile::Builder::new()
        .prefix("witness2test-")
        .suffix(".i")
        .tempfile()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    tracing::debug!(
        "preprocessing {} with `{program}` into {}",
        benchmark.display(),
        out.path().display()
    );
    let status = Command::new(program)
        .arg("-D__attribute__(x)=")
        .args(["-x", "c", "-E"])
        .arg(benchmark)
        .arg("-o")
        .arg(out.path())
        .status()
        .map_err(|e| Error::Preprocessor(format!("failed to run `{program}`: {e}")))?;
    if !status.success() {
        return Err(Error::Preprocessor(format!(
            "`{program}` failed on {} ({status})",
            benchmark.display()
        )));
    }
    let bytes = std::fs::read(out.path()).map_err(|e| Error::io(out.path(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
