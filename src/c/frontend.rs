// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use super::render::*;
use super::sanitize::{LineMap, SanitizedSource};
use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use tree_sitter::{Node, Parser, Tree};

/// Name of the function wrapped around assumption fragments so that they parse as statements.
pub const FRAGMENT_FUNCTION: &str = "__witness_fragment";

/// A function declared (but not necessarily defined) at file scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    /// full signature including the name, e.g. `int __VERIFIER_nondet_int(void)`
    pub rendered: String,
    pub line: u32,
}

/// A declaration directly inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: String,
    /// the declared type without the name, e.g. `int *`
    pub rendered: String,
    pub line: u32,
    pub has_initializer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub rendered: String,
    pub line: u32,
    pub locals: Vec<LocalDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedefDecl {
    pub alias: String,
    pub underlying: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub callee: String,
    pub line: u32,
}

/// The parts of a translation unit we care about, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationUnit {
    pub declarations: Vec<FunctionDecl>,
    pub definitions: Vec<FunctionDef>,
    pub typedefs: Vec<TypedefDecl>,
    pub calls: Vec<CallSite>,
}

/// One statement of a parsed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assignment {
        /// the assigned identifier, `None` if the left-hand side is not a plain identifier
        lvalue: Option<String>,
        target: String,
        value: String,
    },
    Other(String),
}

pub type Statements = SmallVec<[Statement; 2]>;

/// The front-end did not accept its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub msg: String,
    /// byte range of the offending syntax inside `text`
    pub span: Range<usize>,
    /// the text that was handed to the parser
    pub text: String,
}

impl Display for ParseFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = self.span.start.min(self.text.len());
        let line = self.text[..start].matches('\n').count() + 1;
        let excerpt = squash(self.text[start..].lines().next().unwrap_or(""));
        write!(f, "{} at row {line} near `{excerpt}`", self.msg)
    }
}

impl ParseFailure {
    /// Prints the offending text with the failing span highlighted to stderr.
    pub fn report(&self, name: &str) {
        let file = codespan_reporting::files::SimpleFile::new(name, self.text.as_str());
        let diagnostic = codespan_reporting::diagnostic::Diagnostic::error()
            .with_message(&self.msg)
            .with_labels(vec![codespan_reporting::diagnostic::Label::primary(
                (),
                self.span.clone(),
            )]);
        let writer = codespan_reporting::term::termcolor::StandardStream::stderr(
            codespan_reporting::term::termcolor::ColorChoice::Auto,
        );
        let config = codespan_reporting::term::Config::default();
        // nothing sensible left to do if stderr is gone
        let _ = codespan_reporting::term::emit(&mut writer.lock(), &config, &file, &diagnostic);
    }
}

/// Queries the C front-end offers to the rest of the crate.
pub trait CFrontend {
    /// Parses a whole sanitized translation unit.
    fn parse_translation_unit(
        &mut self,
        source: &SanitizedSource,
    ) -> std::result::Result<TranslationUnit, ParseFailure>;

    /// Parses a sequence of statements outside of any function.
    fn parse_statements(&mut self, fragment: &str)
        -> std::result::Result<Statements, ParseFailure>;
}

/// [`CFrontend`] backed by the tree-sitter C grammar.
pub struct TreeSitterFrontend {
    parser: Parser,
}

impl TreeSitterFrontend {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .map_err(|e| Error::InternalConsistency(format!("cannot load C grammar: {e}")))?;
        Ok(Self { parser })
    }

    fn parse_tree(&mut self, text: &str) -> std::result::Result<Tree, ParseFailure> {
        let tree = self.parser.parse(text, None).ok_or_else(|| ParseFailure {
            msg: "parser gave up".to_string(),
            span: 0..0,
            text: text.to_string(),
        })?;
        let root = tree.root_node();
        if root.has_error() {
            let (msg, span) = match find_error(root) {
                Some(bad) if bad.is_missing() => (
                    format!("missing `{}`", bad.kind()),
                    bad.start_byte()..bad.end_byte(),
                ),
                Some(bad) => (
                    "unexpected syntax".to_string(),
                    bad.start_byte()..bad.end_byte(),
                ),
                None => ("unexpected syntax".to_string(), 0..text.len()),
            };
            return Err(ParseFailure {
                msg,
                span,
                text: text.to_string(),
            });
        }
        Ok(tree)
    }
}

impl CFrontend for TreeSitterFrontend {
    fn parse_translation_unit(
        &mut self,
        source: &SanitizedSource,
    ) -> std::result::Result<TranslationUnit, ParseFailure> {
        let tree = self.parse_tree(&source.text)?;
        let mut collector = Collector {
            src: &source.text,
            lines: &source.line_map,
            unit: TranslationUnit::default(),
        };
        collector.collect(tree.root_node());
        Ok(collector.unit)
    }

    fn parse_statements(
        &mut self,
        fragment: &str,
    ) -> std::result::Result<Statements, ParseFailure> {
        let wrapped = format!("void {FRAGMENT_FUNCTION}(void) {{ {fragment}; }}");
        let tree = self.parse_tree(&wrapped)?;
        let root = tree.root_node();
        let body = first_named_child(root)
            .filter(|n| n.kind() == "function_definition")
            .and_then(|def| def.child_by_field_name("body"))
            .ok_or_else(|| ParseFailure {
                msg: "fragment is not a sequence of statements".to_string(),
                span: 0..wrapped.len(),
                text: wrapped.clone(),
            })?;
        let mut out = Statements::new();
        let mut cursor = body.walk();
        for stmt in body.named_children(&mut cursor) {
            if stmt.kind() != "comment" {
                out.push(to_statement(stmt, &wrapped));
            }
        }
        Ok(out)
    }
}

fn to_statement(stmt: Node, src: &str) -> Statement {
    if stmt.kind() == "expression_statement" {
        if let Some(expr) = first_named_child(stmt) {
            let is_plain_assignment = expr.kind() == "assignment_expression"
                && expr
                    .child_by_field_name("operator")
                    .is_some_and(|op| text(op, src) == "=");
            if is_plain_assignment {
                if let (Some(left), Some(right)) = (
                    expr.child_by_field_name("left"),
                    expr.child_by_field_name("right"),
                ) {
                    let lvalue = (left.kind() == "identifier").then(|| text(left, src).to_string());
                    return Statement::Assignment {
                        lvalue,
                        target: render_expr(left, src),
                        value: render_expr(right, src),
                    };
                }
            }
        }
    }
    Statement::Other(squash(text(stmt, src)))
}

/// Depth first search for the first error or missing node.
fn find_error(root: Node) -> Option<Node> {
    let mut todo = vec![root];
    while let Some(node) = todo.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            // reversed so that the leftmost child is looked at first
            todo.extend(children.into_iter().rev());
        }
    }
    None
}

struct Collector<'a> {
    src: &'a str,
    lines: &'a LineMap,
    unit: TranslationUnit,
}

impl<'a> Collector<'a> {
    fn line(&self, node: Node) -> u32 {
        self.lines.presumed_line(node.start_position().row)
    }

    fn collect(&mut self, root: Node) {
        let mut cursor = root.walk();
        for item in root.named_children(&mut cursor) {
            match item.kind() {
                "declaration" => self.declaration(item),
                "function_definition" => self.function_definition(item),
                "type_definition" => self.type_definition(item),
                _ => {}
            }
        }
        self.calls(root);
    }

    fn declaration(&mut self, node: Node) {
        let specifiers = render_specifiers(node, self.src);
        let mut cursor = node.walk();
        for decl in node.children_by_field_name("declarator", &mut cursor) {
            if !declares_function(decl) {
                continue;
            }
            if let Some(name) = declarator_name(decl) {
                let rendered = combine(&specifiers, &render_declarator(decl, self.src, true));
                self.unit.declarations.push(FunctionDecl {
                    name: text(name, self.src).to_string(),
                    rendered,
                    line: self.line(name),
                });
            }
        }
    }

    fn function_definition(&mut self, node: Node) {
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let Some(name) = declarator_name(declarator) else {
            return;
        };
        let specifiers = render_specifiers(node, self.src);
        let mut def = FunctionDef {
            name: text(name, self.src).to_string(),
            rendered: combine(&specifiers, &render_declarator(declarator, self.src, true)),
            line: self.line(name),
            locals: Vec::new(),
        };
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                if item.kind() == "declaration" {
                    self.locals(item, &mut def.locals);
                }
            }
        }
        self.unit.definitions.push(def);
    }

    fn locals(&self, node: Node, out: &mut Vec<LocalDecl>) {
        let specifiers = render_specifiers(node, self.src);
        let mut cursor = node.walk();
        for decl in node.children_by_field_name("declarator", &mut cursor) {
            // block scope function prototypes are not variables
            if declares_function(decl) {
                continue;
            }
            let (inner, has_initializer) = if decl.kind() == "init_declarator" {
                match decl.child_by_field_name("declarator") {
                    Some(inner) => (inner, true),
                    None => continue,
                }
            } else {
                (decl, false)
            };
            if let Some(name) = declarator_name(inner) {
                out.push(LocalDecl {
                    name: text(name, self.src).to_string(),
                    rendered: combine(&specifiers, &render_declarator(inner, self.src, false)),
                    line: self.line(name),
                    has_initializer,
                });
            }
        }
    }

    fn type_definition(&mut self, node: Node) {
        if let Some(tpe) = node.child_by_field_name("type") {
            // there is no spelling to substitute for an untagged aggregate
            if is_anonymous_aggregate(tpe) {
                return;
            }
        }
        let specifiers = render_specifiers(node, self.src);
        let mut cursor = node.walk();
        for decl in node.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = declarator_name(decl) {
                self.unit.typedefs.push(TypedefDecl {
                    alias: text(name, self.src).to_string(),
                    underlying: combine(&specifiers, &render_declarator(decl, self.src, false)),
                    line: self.line(name),
                });
            }
        }
    }

    /// Every call through a plain identifier, anywhere in the unit.
    fn calls(&mut self, root: Node) {
        let mut todo = vec![root];
        while let Some(node) = todo.pop() {
            if node.kind() == "call_expression" {
                if let Some(callee) = node.child_by_field_name("function") {
                    if callee.kind() == "identifier" {
                        self.unit.calls.push(CallSite {
                            callee: text(callee, self.src).to_string(),
                            line: self.line(callee),
                        });
                    }
                }
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            todo.extend(children.into_iter().rev());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> TranslationUnit {
        TreeSitterFrontend::new()
            .unwrap()
            .parse_translation_unit(&SanitizedSource::verbatim(src))
            .unwrap()
    }

    fn statements(fragment: &str) -> Statements {
        TreeSitterFrontend::new()
            .unwrap()
            .parse_statements(fragment)
            .unwrap()
    }

    const PROGRAM: &str = r#"extern int __VERIFIER_nondet_int(void);
extern unsigned char __VERIFIER_nondet_uchar();
typedef unsigned int u32;
typedef int (*handler)(int, char *);
int main(void) {
  int x;
  u32 y = 3;
  char *p, buf[4];
  x = __VERIFIER_nondet_int();
  if (x > 1) { p = 0; __VERIFIER_nondet_uchar(); }
  return 0;
}
"#;

    #[test]
    fn function_declarations() {
        let unit = parse(PROGRAM);
        assert_eq!(
            unit.declarations,
            vec![
                FunctionDecl {
                    name: "__VERIFIER_nondet_int".to_string(),
                    rendered: "int __VERIFIER_nondet_int(void)".to_string(),
                    line: 1,
                },
                FunctionDecl {
                    name: "__VERIFIER_nondet_uchar".to_string(),
                    rendered: "unsigned char __VERIFIER_nondet_uchar()".to_string(),
                    line: 2,
                },
            ]
        );
    }

    #[test]
    fn typedefs() {
        let unit = parse(PROGRAM);
        let typedefs: Vec<_> = unit
            .typedefs
            .iter()
            .map(|t| (t.alias.as_str(), t.underlying.as_str()))
            .collect();
        assert_eq!(
            typedefs,
            vec![("u32", "unsigned int"), ("handler", "int(*)(int, char *)")]
        );
    }

    #[test]
    fn locals_and_entry() {
        let unit = parse(PROGRAM);
        assert_eq!(unit.definitions.len(), 1);
        let main = &unit.definitions[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.rendered, "int main(void)");
        assert_eq!(main.line, 5);
        let locals: Vec<_> = main
            .locals
            .iter()
            .map(|l| (l.name.as_str(), l.rendered.as_str(), l.line, l.has_initializer))
            .collect();
        assert_eq!(
            locals,
            vec![
                ("x", "int", 6, false),
                ("y", "u32", 7, true),
                ("p", "char *", 8, false),
                ("buf", "char[4]", 8, false),
            ]
        );
    }

    #[test]
    fn call_sites() {
        let unit = parse(PROGRAM);
        let calls: Vec<_> = unit
            .calls
            .iter()
            .map(|c| (c.callee.as_str(), c.line))
            .collect();
        assert_eq!(
            calls,
            vec![("__VERIFIER_nondet_int", 9), ("__VERIFIER_nondet_uchar", 10)]
        );
    }

    #[test]
    fn line_map_is_applied() {
        let sanitized =
            crate::c::sanitize("# 20 \"bench.c\"\nint f(void);\nint main(void) { return f(); }\n")
                .unwrap();
        let unit = TreeSitterFrontend::new()
            .unwrap()
            .parse_translation_unit(&sanitized)
            .unwrap();
        assert_eq!(unit.declarations[0].line, 20);
        assert_eq!(unit.definitions[0].line, 21);
        assert_eq!(unit.calls[0].line, 21);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = TreeSitterFrontend::new()
            .unwrap()
            .parse_translation_unit(&SanitizedSource::verbatim("int main( { return 0; }\n"))
            .unwrap_err();
        assert!(!err.msg.is_empty());
        assert!(err.span.start <= err.text.len());
    }

    #[test]
    fn assignments() {
        let stmts = statements("x = 5");
        assert_eq!(
            stmts.as_slice(),
            &[Statement::Assignment {
                lvalue: Some("x".to_string()),
                target: "x".to_string(),
                value: "5".to_string(),
            }]
        );
        let stmts = statements("x = -1; y = (unsigned int)7; a[0] = 3");
        assert_eq!(stmts.len(), 3);
        assert_eq!(
            stmts[1],
            Statement::Assignment {
                lvalue: Some("y".to_string()),
                target: "y".to_string(),
                value: "(unsigned int) 7".to_string(),
            }
        );
        match &stmts[2] {
            Statement::Assignment { lvalue, target, .. } => {
                assert_eq!(lvalue, &None);
                assert_eq!(target, "a[0]");
            }
            other => panic!("expected an assignment, not {other:?}"),
        }
        match &stmts[0] {
            Statement::Assignment { value, .. } => assert_eq!(value, "-1"),
            other => panic!("expected an assignment, not {other:?}"),
        }
    }

    #[test]
    fn non_assignments_are_kept_as_other() {
        let stmts = statements("x != 5");
        assert!(matches!(stmts[0], Statement::Other(_)));
    }

    #[test]
    fn broken_fragment_fails() {
        let err = TreeSitterFrontend::new()
            .unwrap()
            .parse_statements("x = = 5")
            .unwrap_err();
        assert!(err.text.contains(FRAGMENT_FUNCTION));
    }
}
