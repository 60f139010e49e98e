// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Binds the assumptions along a linear witness trace to program inputs.

use crate::c::{CFrontend, Statement};
use crate::decls::{DeclarationModel, TypedefChain, WatchMap};
use crate::error::{Error, Result};
use crate::witness::{AutomatonEdge, LinearTrace};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Identifier that stands in for `\result` in assumptions.
pub const RESULT_PLACEHOLDER: &str = "__SV_COMP_result";

/// Upper bound on typedef substitution rounds for one assumption.
pub const MAX_SUBSTITUTION_ROUNDS: usize = 4;

lazy_static! {
    static ref CAST_LIKE: Regex = Regex::new(r"\(\s*[a-zA-Z_][a-zA-Z0-9_]*.*\)").unwrap();
    static ref DOUBLED_KEYWORD: Regex =
        Regex::new(r"\b(struct|union|enum)\s+(struct|union|enum)\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueBinding {
    /// value returned by the nondet function called on a watched line
    Nondet { function: String, value: String },
    /// value observed for an uninitialized local variable
    Local {
        function: String,
        variable: String,
        value: String,
    },
}

/// Result of walking a trace: bindings in trace order plus the watched functions that never
/// received a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub bindings: Vec<ValueBinding>,
    pub missing: Vec<String>,
}

/// Witnesses write assumptions as equalities, we read them as assignments.
pub fn normalize_assumption(assumption: &str) -> String {
    assumption
        .replace("==", "=")
        .replace("\\result", RESULT_PLACEHOLDER)
}

/// Replaces typedef aliases by their resolved spelling when the assumption contains something
/// that looks like a cast. Runs until nothing changes, a text repeats or the round limit is hit.
/// A round that produces a doubled aggregate keyword (`struct struct`) is undone and ends
/// the substitution.
pub fn substitute_typedefs(text: &str, typedefs: &TypedefChain) -> String {
    if typedefs.is_empty() || !CAST_LIKE.is_match(text) {
        return text.to_string();
    }
    let mut current = text.to_string();
    let mut seen = HashSet::new();
    seen.insert(current.clone());
    for _ in 0..MAX_SUBSTITUTION_ROUNDS {
        let mut next = current.clone();
        for (alias, resolved) in typedefs.iter() {
            if alias != resolved {
                next = replace_word(&next, alias, resolved);
            }
        }
        if next == current {
            break;
        }
        if DOUBLED_KEYWORD.is_match(&next) && !DOUBLED_KEYWORD.is_match(&current) {
            tracing::debug!("rolled back typedef substitution `{next}`");
            break;
        }
        if !seen.insert(next.clone()) {
            break;
        }
        current = next;
    }
    current
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replaces all occurrences of `word` in `text` that are not part of a longer identifier.
fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    if word.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for (pos, _) in text.match_indices(word) {
        let end = pos + word.len();
        let before_ok = !text[..pos].chars().next_back().is_some_and(is_ident_char);
        let after_ok = !text[end..].chars().next().is_some_and(is_ident_char);
        if before_ok && after_ok {
            out.push_str(&text[copied..pos]);
            out.push_str(replacement);
            copied = end;
        }
    }
    out.push_str(&text[copied..]);
    out
}

/// Walks `trace` and resolves every assumption against the watch map and the local inputs.
pub fn correlate(
    trace: &LinearTrace,
    decls: &DeclarationModel,
    watch: &WatchMap,
    frontend: &mut impl CFrontend,
) -> Result<Correlation> {
    let mut out = Correlation::default();
    let mut matched: HashSet<String> = HashSet::new();
    for edge in trace.iter() {
        let Some(assumption) = edge.assumption.as_deref() else {
            continue;
        };
        let normalized = normalize_assumption(assumption);
        let substituted = substitute_typedefs(&normalized, decls.typedefs());
        let statements = frontend
            .parse_statements(&substituted)
            .map_err(|failure| Error::FragmentParse {
                original: assumption.to_string(),
                substituted: substituted.clone(),
                failure,
            })?;
        for stmt in statements.iter() {
            if let Some(binding) = bind(edge, stmt, decls, watch) {
                if let ValueBinding::Nondet { function, .. } = &binding {
                    matched.insert(function.clone());
                }
                out.bindings.push(binding);
            }
        }
    }

    let mut missing: Vec<&str> = watch
        .functions()
        .into_iter()
        .filter(|f| !matched.contains(*f))
        .collect();
    missing.sort_by_key(|f| (decls.nondet(f).map(|n| n.line).unwrap_or(u32::MAX), *f));
    out.missing = missing.into_iter().map(|f| f.to_string()).collect();
    Ok(out)
}

fn bind(
    edge: &AutomatonEdge,
    stmt: &Statement,
    decls: &DeclarationModel,
    watch: &WatchMap,
) -> Option<ValueBinding> {
    let Statement::Assignment { lvalue, value, .. } = stmt else {
        tracing::debug!("ignoring `{stmt:?}`, not an assignment");
        return None;
    };
    if let Some(function) = edge.start_line.and_then(|line| watch.get(line)) {
        tracing::debug!("{function} returns {value}");
        return Some(ValueBinding::Nondet {
            function: function.to_string(),
            value: value.clone(),
        });
    }
    if let (Some(function), Some(variable)) = (edge.scope.as_deref(), lvalue.as_deref()) {
        if decls.local_input(function, variable).is_some() {
            tracing::debug!("{function}::{variable} = {value}");
            return Some(ValueBinding::Local {
                function: function.to_string(),
                variable: variable.to_string(),
                value: value.clone(),
            });
        }
    }
    tracing::debug!(
        "discarding `{value}` assigned on edge {} -> {}",
        edge.source,
        edge.target
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c::{SanitizedSource, TreeSitterFrontend};

    const PROGRAM: &str = r#"typedef unsigned int u32;
typedef struct node node;
struct node { int v; };
int __VERIFIER_nondet_int(void);
char __VERIFIER_nondet_char(void);
int main(void) {
  int x;
  u32 n;
  int y = __VERIFIER_nondet_int();
  char c = __VERIFIER_nondet_char();
  return 0;
}
"#;

    fn setup() -> (TreeSitterFrontend, DeclarationModel, WatchMap) {
        let mut frontend = TreeSitterFrontend::new().unwrap();
        let unit = frontend
            .parse_translation_unit(&SanitizedSource::verbatim(PROGRAM))
            .unwrap();
        let decls = DeclarationModel::build(&unit, "main").unwrap();
        let watch = WatchMap::build(&unit.calls).unwrap();
        (frontend, decls, watch)
    }

    fn edge(assumption: &str, scope: Option<&str>, line: Option<u32>) -> AutomatonEdge {
        AutomatonEdge {
            source: "A".to_string(),
            target: "B".to_string(),
            assumption: Some(assumption.to_string()),
            scope: scope.map(|s| s.to_string()),
            start_line: line,
        }
    }

    fn trace(edges: Vec<AutomatonEdge>) -> LinearTrace {
        LinearTrace { edges }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_assumption("x == 5;"), "x = 5;");
        assert_eq!(
            normalize_assumption("\\result == 3"),
            "__SV_COMP_result = 3"
        );
    }

    #[test]
    fn typedefs_are_substituted_at_word_boundaries() {
        let mut chain = TypedefChain::default();
        chain.define("u32", "unsigned int");
        chain.define("len_t", "u32");
        assert_eq!(
            substitute_typedefs("x = (len_t) 4", &chain),
            "x = (unsigned int) 4"
        );
        // no cast, nothing to do
        assert_eq!(substitute_typedefs("u32x = 4", &chain), "u32x = 4");
        assert_eq!(
            substitute_typedefs("u32u32 = (u32u32) 4", &chain),
            "u32u32 = (u32u32) 4"
        );
        assert_eq!(
            substitute_typedefs("u32x = (u32) 4", &chain),
            "u32x = (unsigned int) 4"
        );
    }

    #[test]
    fn doubled_keyword_is_rolled_back() {
        let mut chain = TypedefChain::default();
        chain.define("node", "struct node");
        assert_eq!(
            substitute_typedefs("p = (struct node *) 0", &chain),
            "p = (struct node *) 0"
        );
        assert_eq!(
            substitute_typedefs("p = (node *) 0", &chain),
            "p = (struct node *) 0"
        );
    }

    #[test]
    fn substitution_terminates_on_growing_aliases() {
        let mut chain = TypedefChain::default();
        chain.define("a", "a a");
        let out = substitute_typedefs("x = (a) 1", &chain);
        assert!(out.starts_with("x = (a a"), "{out}");
    }

    #[test]
    fn watched_line_binds_nondet() {
        let (mut frontend, decls, watch) = setup();
        let res = correlate(
            &trace(vec![edge("\\result == 5", Some("main"), Some(9))]),
            &decls,
            &watch,
            &mut frontend,
        )
        .unwrap();
        assert_eq!(
            res.bindings,
            vec![ValueBinding::Nondet {
                function: "__VERIFIER_nondet_int".to_string(),
                value: "5".to_string()
            }]
        );
        assert_eq!(res.missing, vec!["__VERIFIER_nondet_char".to_string()]);
    }

    #[test]
    fn watch_line_wins_over_scope() {
        let (mut frontend, decls, watch) = setup();
        let res = correlate(
            &trace(vec![edge("x == 7", Some("main"), Some(10))]),
            &decls,
            &watch,
            &mut frontend,
        )
        .unwrap();
        assert_eq!(
            res.bindings,
            vec![ValueBinding::Nondet {
                function: "__VERIFIER_nondet_char".to_string(),
                value: "7".to_string()
            }]
        );
    }

    #[test]
    fn scoped_locals_and_discards() {
        let (mut frontend, decls, watch) = setup();
        let edges = vec![
            edge("x == 1; n == (u32) 2", Some("main"), Some(7)),
            // y is initialized, so it is no input
            edge("y == 3", Some("main"), None),
            edge("x == 4", None, None),
            edge("x == 5", Some("other"), None),
            edge("x > 5", Some("main"), None),
        ];
        let res = correlate(&trace(edges), &decls, &watch, &mut frontend).unwrap();
        assert_eq!(
            res.bindings,
            vec![
                ValueBinding::Local {
                    function: "main".to_string(),
                    variable: "x".to_string(),
                    value: "1".to_string()
                },
                ValueBinding::Local {
                    function: "main".to_string(),
                    variable: "n".to_string(),
                    value: "(unsigned int) 2".to_string()
                },
            ]
        );
        // missing nondets are ordered by declaration line
        assert_eq!(
            res.missing,
            vec![
                "__VERIFIER_nondet_int".to_string(),
                "__VERIFIER_nondet_char".to_string()
            ]
        );
    }

    #[test]
    fn fragment_errors_keep_both_texts() {
        let (mut frontend, decls, watch) = setup();
        let err = correlate(
            &trace(vec![edge("x == == (u32) 1", Some("main"), None)]),
            &decls,
            &watch,
            &mut frontend,
        )
        .unwrap_err();
        match err {
            Error::FragmentParse {
                original,
                substituted,
                ..
            } => {
                assert_eq!(original, "x == == (u32) 1");
                assert_eq!(substituted, "x = = (unsigned int) 1");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
