// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Reads the GraphML encoding of a witness automaton.

use crate::error::{Error, Result};
use crate::witness::{AutomatonEdge, AutomatonNode, WitnessConfig};
use roxmltree::Node;

pub const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

/// Raw content of a witness file. Nothing has been checked apart from well-formedness.
#[derive(Debug, Clone, Default)]
pub struct WitnessDocument {
    pub config: WitnessConfig,
    pub nodes: Vec<AutomatonNode>,
    pub edges: Vec<AutomatonEdge>,
}

pub fn parse_witness(text: &str) -> Result<WitnessDocument> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(text, options)
        .map_err(|e| Error::malformed(format!("not a well-formed XML document: {e}")))?;
    let graph = doc
        .descendants()
        .find(|n| n.has_tag_name((GRAPHML_NS, "graph")))
        .ok_or_else(|| Error::malformed("no graph element"))?;

    let mut out = WitnessDocument::default();
    for child in graph.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            _ if child.tag_name().namespace() != Some(GRAPHML_NS) => {}
            "data" => {
                let key = required_attribute(child, "key")?;
                out.config.insert(key, &data_text(child));
            }
            "node" => out.nodes.push(parse_node(child)?),
            "edge" => out.edges.push(parse_edge(child)?),
            _ => {}
        }
    }
    Ok(out)
}

fn parse_node(node: Node) -> Result<AutomatonNode> {
    let mut out = AutomatonNode {
        id: required_attribute(node, "id")?.to_string(),
        ..AutomatonNode::default()
    };
    for (key, value) in data_entries(node)? {
        let flag = value == "true";
        match key {
            "entry" => out.is_entry = flag,
            "violation" => out.is_violation = flag,
            "sink" => out.is_sink = flag,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_edge(edge: Node) -> Result<AutomatonEdge> {
    let mut out = AutomatonEdge {
        source: required_attribute(edge, "source")?.to_string(),
        target: required_attribute(edge, "target")?.to_string(),
        ..AutomatonEdge::default()
    };
    for (key, value) in data_entries(edge)? {
        match key {
            "assumption" => out.assumption = Some(value),
            "assumption.scope" => out.scope = Some(value),
            "startline" => {
                let line = value.parse::<u32>().map_err(|_| {
                    Error::malformed(format!(
                        "edge {} -> {} has non-integer startline `{value}`",
                        out.source, out.target
                    ))
                })?;
                out.start_line = Some(line);
            }
            _ => {}
        }
    }
    Ok(out)
}

fn data_entries<'a>(element: Node<'a, '_>) -> Result<Vec<(&'a str, String)>> {
    element
        .children()
        .filter(|n| n.has_tag_name((GRAPHML_NS, "data")))
        .map(|n| Ok((required_attribute(n, "key")?, data_text(n))))
        .collect()
}

/// All text below a `data` element with surrounding white space removed.
fn data_text(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.trim().to_string()
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        Error::malformed(format!(
            "`{}` element without `{name}` attribute",
            node.tag_name().name()
        ))
    })
}
