// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Declaration and call-site models built from a parsed benchmark.

use crate::c::{CallSite, TranslationUnit};
use crate::error::{Error, Result};
use fuzzy_matcher::FuzzyMatcher;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Functions whose return value models an unconstrained input.
pub const NONDET_PREFIX: &str = "__VERIFIER_nondet_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NondetSignature {
    pub name: String,
    pub rendered: String,
    pub line: u32,
}

/// A local variable declared without initializer, i.e., a true input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInputDecl {
    pub rendered: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub rendered: String,
    pub line: u32,
}

/// Typedef aliases mapped to their fully resolved spelling, in definition order.
#[derive(Debug, Clone, Default)]
pub struct TypedefChain {
    aliases: IndexMap<String, String>,
}

impl TypedefChain {
    /// Adds `alias`, resolving `underlying` through the aliases defined so far.
    pub fn define(&mut self, alias: &str, underlying: &str) {
        let resolved = self.resolve(underlying);
        self.aliases.insert(alias.to_string(), resolved);
    }

    /// Follows the chain starting at `spelling` until no alias applies.
    /// A self-referential or cyclic chain stops at the first repeated spelling.
    pub fn resolve(&self, spelling: &str) -> String {
        let mut current = spelling;
        let mut seen = HashSet::new();
        while let Some(next) = self.aliases.get(current) {
            if !seen.insert(current) || next == current {
                break;
            }
            current = next;
        }
        current.to_string()
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, u)| (a.as_str(), u.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Everything the correlation and the manifest need to know about the benchmark's declarations.
#[derive(Debug, Clone)]
pub struct DeclarationModel {
    nondets: IndexMap<String, NondetSignature>,
    inputs: IndexMap<String, IndexMap<String, LocalInputDecl>>,
    typedefs: TypedefChain,
    entry: EntryInfo,
}

impl DeclarationModel {
    pub fn build(unit: &TranslationUnit, entry_name: &str) -> Result<Self> {
        let mut builder = DeclarationBuilder::default();
        for typedef in unit.typedefs.iter() {
            builder.typedefs.define(&typedef.alias, &typedef.underlying);
        }
        for decl in unit.declarations.iter() {
            if decl.name.starts_with(NONDET_PREFIX) {
                builder.nondets.insert(
                    decl.name.clone(),
                    NondetSignature {
                        name: decl.name.clone(),
                        rendered: decl.rendered.clone(),
                        line: decl.line,
                    },
                );
            }
        }
        for def in unit.definitions.iter() {
            let inputs = builder.inputs.entry(def.name.clone()).or_default();
            for local in def.locals.iter().filter(|l| !l.has_initializer) {
                let rendered = match builder.typedefs.get(&local.rendered) {
                    Some(resolved) => resolved.to_string(),
                    None => local.rendered.clone(),
                };
                inputs.insert(
                    local.name.clone(),
                    LocalInputDecl {
                        rendered,
                        line: local.line,
                    },
                );
            }
            if def.name == entry_name {
                builder.entry = Some(EntryInfo {
                    name: def.name.clone(),
                    rendered: def.rendered.clone(),
                    line: def.line,
                });
            }
        }
        builder.finish(unit, entry_name)
    }

    pub fn nondet(&self, name: &str) -> Option<&NondetSignature> {
        self.nondets.get(name)
    }

    pub fn nondets(&self) -> impl Iterator<Item = &NondetSignature> {
        self.nondets.values()
    }

    pub fn local_input(&self, function: &str, variable: &str) -> Option<&LocalInputDecl> {
        self.inputs.get(function)?.get(variable)
    }

    pub fn inputs(&self) -> &IndexMap<String, IndexMap<String, LocalInputDecl>> {
        &self.inputs
    }

    pub fn typedefs(&self) -> &TypedefChain {
        &self.typedefs
    }

    pub fn entry(&self) -> &EntryInfo {
        &self.entry
    }
}

#[derive(Default)]
struct DeclarationBuilder {
    nondets: IndexMap<String, NondetSignature>,
    inputs: IndexMap<String, IndexMap<String, LocalInputDecl>>,
    typedefs: TypedefChain,
    entry: Option<EntryInfo>,
}

impl DeclarationBuilder {
    fn finish(self, unit: &TranslationUnit, entry_name: &str) -> Result<DeclarationModel> {
        let Some(entry) = self.entry else {
            return Err(missing_entry_error(unit, entry_name));
        };
        Ok(DeclarationModel {
            nondets: self.nondets,
            inputs: self.inputs,
            typedefs: self.typedefs,
            entry,
        })
    }
}

fn missing_entry_error(unit: &TranslationUnit, entry_name: &str) -> Error {
    let matcher = fuzzy_matcher::skim::SkimMatcherV2::default();
    let mut matches: Vec<(&str, i64)> = unit
        .definitions
        .iter()
        .flat_map(|d| {
            matcher
                .fuzzy_match(&d.name, entry_name)
                .map(|s| (d.name.as_str(), s))
        })
        .collect();
    matches.sort_by_key(|(_, s)| -(*s));
    let suggestions = matches
        .iter()
        .take(5)
        .map(|(n, _)| *n)
        .collect::<Vec<&str>>()
        .join(", ");
    let mut msg = format!("entry function `{entry_name}` is not defined in the benchmark");
    if !suggestions.is_empty() {
        msg.push_str(&format!(". Did you mean: {suggestions}?"));
    }
    Error::malformed(msg)
}

/// Source line → nondeterministic function called on that line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchMap {
    lines: BTreeMap<u32, String>,
}

impl WatchMap {
    /// Watches every call site of a function carrying the nondet prefix.
    pub fn build(calls: &[CallSite]) -> Result<Self> {
        let mut watch = WatchMap::default();
        for call in calls.iter().filter(|c| c.callee.starts_with(NONDET_PREFIX)) {
            watch.watch(call.line, &call.callee)?;
        }
        Ok(watch)
    }

    /// Records that `line` calls `function`. Two different functions on one line cannot be
    /// told apart by a line-keyed witness.
    pub fn watch(&mut self, line: u32, function: &str) -> Result<()> {
        match self.lines.get(&line) {
            Some(existing) if existing != function => Err(Error::InternalConsistency(format!(
                "line {line} calls both `{existing}` and `{function}`"
            ))),
            Some(_) => Ok(()),
            None => {
                self.lines.insert(line, function.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, line: u32) -> Option<&str> {
        self.lines.get(&line).map(|s| s.as_str())
    }

    /// All watched functions, each once.
    pub fn functions(&self) -> BTreeSet<&str> {
        self.lines.values().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
