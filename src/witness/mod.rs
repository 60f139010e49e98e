// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod automaton;
mod config;
mod graphml;

pub use automaton::{Automaton, AutomatonEdge, AutomatonNode, LinearTrace};
pub use config::{program_hash, EntrySpec, WitnessConfig, MANDATORY_KEYS};
pub use graphml::{parse_witness, WitnessDocument, GRAPHML_NS};
