// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::correlate::{Correlation, ValueBinding};
use crate::decls::{DeclarationModel, EntryInfo, WatchMap};
use crate::error::{Diagnostics, Warning};
use std::fmt::{Display, Formatter};
use std::io::Write;

/// One input value of the test vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    Local {
        tpe: String,
        variable: String,
        line: u32,
        function: String,
        value: String,
    },
    Nondet {
        tpe: String,
        line: u32,
        value: String,
    },
}

/// The test vector: entry point followed by input values in the order they are consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub benchmark: String,
    pub entry: EntryInfo,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn synthesize(
        benchmark: &str,
        decls: &DeclarationModel,
        watch: &WatchMap,
        correlation: &Correlation,
        diag: &mut Diagnostics,
    ) -> Self {
        let mut entries =
            Vec::with_capacity(correlation.bindings.len() + correlation.missing.len());
        for binding in correlation.bindings.iter() {
            match binding {
                ValueBinding::Local {
                    function,
                    variable,
                    value,
                } => {
                    // bindings are only created for known locals
                    if let Some(decl) = decls.local_input(function, variable) {
                        entries.push(ManifestEntry::Local {
                            tpe: decl.rendered.clone(),
                            variable: variable.clone(),
                            line: decl.line,
                            function: function.clone(),
                            value: value.clone(),
                        });
                    }
                }
                ValueBinding::Nondet { function, value } => {
                    if let Some(entry) = nondet_entry(decls, function, value, diag) {
                        entries.push(entry);
                    }
                }
            }
        }
        for function in correlation.missing.iter() {
            if let Some(entry) = nondet_entry(decls, function, "0", diag) {
                entries.push(entry);
            }
        }

        if !watch.is_empty() && correlation.bindings.is_empty() {
            tracing::debug!("inputs: {:?}", decls.inputs());
            tracing::debug!("nondets: {:?}", decls.nondets().collect::<Vec<_>>());
            tracing::debug!("watch: {:?}", watch);
            diag.warn(Warning::NoInputValues);
        }

        Manifest {
            benchmark: benchmark.to_string(),
            entry: decls.entry().clone(),
            entries,
        }
    }

    pub fn write(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "IN:")?;
        writeln!(
            out,
            "  ENTRY {}()@[file {} line {}]",
            self.entry.name, self.benchmark, self.entry.line
        )?;
        for entry in self.entries.iter() {
            match entry {
                ManifestEntry::Local {
                    tpe,
                    variable,
                    line,
                    function,
                    value,
                } => writeln!(
                    out,
                    "  {tpe} {variable}@[file {} line {line} function {function}]={value}",
                    self.benchmark
                )?,
                ManifestEntry::Nondet { tpe, line, value } => writeln!(
                    out,
                    "  {tpe}@[file {} line {line}]={value}",
                    self.benchmark
                )?,
            }
        }
        Ok(())
    }
}

fn nondet_entry(
    decls: &DeclarationModel,
    function: &str,
    value: &str,
    diag: &mut Diagnostics,
) -> Option<ManifestEntry> {
    match decls.nondet(function) {
        Some(sig) => Some(ManifestEntry::Nondet {
            tpe: sig.rendered.clone(),
            line: sig.line,
            value: value.to_string(),
        }),
        None => {
            let warning = Warning::UndeclaredNondet(function.to_string());
            if !diag.contains(&warning) {
                diag.warn(warning);
            }
            None
        }
    }
}

impl Display for Manifest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut buf = Vec::new();
        self.write(&mut buf).map_err(|_| std::fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}
