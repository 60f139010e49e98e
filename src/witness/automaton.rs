// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::{Diagnostics, Error, Result, Warning};
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomatonNode {
    pub id: String,
    pub is_entry: bool,
    pub is_violation: bool,
    pub is_sink: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomatonEdge {
    pub source: String,
    pub target: String,
    pub assumption: Option<String>,
    /// enclosing function of the assumption
    pub scope: Option<String>,
    pub start_line: Option<u32>,
}

/// A validated witness automaton in which every node has at most one successor.
#[derive(Debug, Clone)]
pub struct Automaton {
    entry: String,
    violation: Option<String>,
    successors: IndexMap<String, AutomatonEdge>,
}

/// Edges in the order they are taken when starting from the entry node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearTrace {
    pub edges: Vec<AutomatonEdge>,
}

impl LinearTrace {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AutomatonEdge> {
        self.edges.iter()
    }
}

impl Automaton {
    pub fn build(
        nodes: &[AutomatonNode],
        edges: &[AutomatonEdge],
        diag: &mut Diagnostics,
    ) -> Result<Self> {
        let mut by_id: IndexMap<&str, &AutomatonNode> = IndexMap::with_capacity(nodes.len());
        for node in nodes.iter() {
            if by_id.insert(node.id.as_str(), node).is_some() {
                return Err(Error::malformed(format!("duplicate node `{}`", node.id)));
            }
        }

        let entries: Vec<&AutomatonNode> = nodes.iter().filter(|n| n.is_entry).collect();
        let entry = match entries.as_slice() {
            [entry] => entry.id.clone(),
            [] => return Err(Error::malformed("no entry node")),
            _ => return Err(Error::malformed("multiple entry nodes")),
        };
        let violations: Vec<&AutomatonNode> = nodes.iter().filter(|n| n.is_violation).collect();
        let violation = match violations.as_slice() {
            [] => {
                diag.warn(Warning::NoViolationNode);
                None
            }
            [v] => Some(v.id.clone()),
            _ => return Err(Error::malformed("multiple violation nodes")),
        };

        let mut successors = IndexMap::new();
        for edge in edges.iter() {
            let (Some(_), Some(target)) = (
                by_id.get(edge.source.as_str()),
                by_id.get(edge.target.as_str()),
            ) else {
                return Err(Error::malformed(format!(
                    "edge {} -> {} references an undeclared node",
                    edge.source, edge.target
                )));
            };
            if Some(&edge.source) == violation.as_ref() || target.is_sink {
                continue;
            }
            if successors.contains_key(&edge.source) {
                return Err(Error::malformed(format!(
                    "witness is not a linear path, node `{}` has more than one successor",
                    edge.source
                )));
            }
            successors.insert(edge.source.clone(), edge.clone());
        }

        Ok(Automaton {
            entry,
            violation,
            successors,
        })
    }

    pub fn violation(&self) -> Option<&str> {
        self.violation.as_deref()
    }

    /// Follows successors from the entry node until a node without one is reached.
    pub fn linearize(&self) -> Result<LinearTrace> {
        let mut trace = LinearTrace::default();
        let mut visited = HashSet::new();
        let mut current = self.entry.as_str();
        visited.insert(current);
        while let Some(edge) = self.successors.get(current) {
            if !visited.insert(edge.target.as_str()) {
                return Err(Error::malformed(format!(
                    "witness path contains a cycle through node `{}`",
                    edge.target
                )));
            }
            trace.edges.push(edge.clone());
            current = edge.target.as_str();
        }
        if let Some(violation) = self.violation.as_deref() {
            if current != violation {
                return Err(Error::malformed(format!(
                    "witness path ends in `{current}` instead of violation node `{violation}`"
                )));
            }
        }
        tracing::debug!("linear trace with {} edges", trace.len());
        Ok(trace)
    }
}
