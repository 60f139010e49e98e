// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Canonical C spellings of types, declarators and expressions from tree-sitter nodes.

use tree_sitter::Node;

/// Source text of `node`, or the empty string for nodes that do not cover valid utf-8.
pub(crate) fn text<'a>(node: Node, src: &'a str) -> &'a str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

/// Collapses runs of white space into single spaces.
pub(crate) fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders the qualifiers and the type specifier of a declaration-like node
/// (`declaration`, `parameter_declaration`, `type_definition`, `type_descriptor`, ...).
/// Storage classes are dropped.
pub(crate) fn render_specifiers(node: Node, src: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "type_qualifier" {
            parts.push(text(child, src).to_string());
        }
    }
    if let Some(tpe) = node.child_by_field_name("type") {
        parts.push(render_type_specifier(tpe, src));
    }
    parts.join(" ")
}

/// Aggregates with a tag are referred to by tag, anything else is spelled out.
pub(crate) fn render_type_specifier(node: Node, src: &str) -> String {
    match node.kind() {
        "struct_specifier" | "union_specifier" | "enum_specifier" => {
            match node.child_by_field_name("name") {
                Some(name) => format!("{} {}", aggregate_keyword(node), text(name, src)),
                None => squash(text(node, src)),
            }
        }
        _ => squash(text(node, src)),
    }
}

fn aggregate_keyword(node: Node) -> &'static str {
    match node.kind() {
        "struct_specifier" => "struct",
        "union_specifier" => "union",
        _ => "enum",
    }
}

/// An aggregate type specifier that carries a body but no tag.
pub(crate) fn is_anonymous_aggregate(node: Node) -> bool {
    matches!(
        node.kind(),
        "struct_specifier" | "union_specifier" | "enum_specifier"
    ) && node.child_by_field_name("name").is_none()
}

/// Glues specifiers and a rendered declarator together.
pub(crate) fn combine(specifiers: &str, declarator: &str) -> String {
    if declarator.is_empty() {
        specifiers.to_string()
    } else if specifiers.is_empty() {
        declarator.to_string()
    } else if declarator.starts_with('(') || declarator.starts_with('[') {
        format!("{specifiers}{declarator}")
    } else {
        format!("{specifiers} {declarator}")
    }
}

/// Renders a (possibly abstract) declarator. With `keep_name == false` the declared name is
/// left out, which turns `int (*fp)(int)` into `(*)(int)`.
pub(crate) fn render_declarator(node: Node, src: &str, keep_name: bool) -> String {
    match node.kind() {
        "identifier" | "type_identifier" | "field_identifier" | "primitive_type" => {
            if keep_name {
                text(node, src).to_string()
            } else {
                String::new()
            }
        }
        "pointer_declarator" | "pointer_type_declarator" | "abstract_pointer_declarator" => {
            let mut out = String::from("*");
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "type_qualifier" {
                    out.push_str(text(child, src));
                    out.push(' ');
                }
            }
            if let Some(inner) = node.child_by_field_name("declarator") {
                out.push_str(&render_declarator(inner, src, keep_name));
            }
            out.trim_end().to_string()
        }
        "array_declarator" | "array_type_declarator" | "abstract_array_declarator" => {
            let inner = inner_declarator(node, src, keep_name);
            let size = node
                .child_by_field_name("size")
                .map(|s| render_expr(s, src))
                .unwrap_or_default();
            format!("{}[{size}]", parenthesize_pointer(inner))
        }
        "function_declarator" | "function_type_declarator" | "abstract_function_declarator" => {
            let inner = inner_declarator(node, src, keep_name);
            let params = node
                .child_by_field_name("parameters")
                .map(|p| render_parameters(p, src))
                .unwrap_or_else(|| "()".to_string());
            format!("{}{params}", parenthesize_pointer(inner))
        }
        "parenthesized_declarator"
        | "parenthesized_type_declarator"
        | "abstract_parenthesized_declarator"
        | "attributed_declarator"
        | "attributed_type_declarator" => match first_named_child(node) {
            Some(inner) => render_declarator(inner, src, keep_name),
            None => String::new(),
        },
        "init_declarator" => match node.child_by_field_name("declarator") {
            Some(inner) => render_declarator(inner, src, keep_name),
            None => String::new(),
        },
        _ => squash(text(node, src)),
    }
}

fn inner_declarator(node: Node, src: &str, keep_name: bool) -> String {
    node.child_by_field_name("declarator")
        .map(|d| render_declarator(d, src, keep_name))
        .unwrap_or_default()
}

fn parenthesize_pointer(inner: String) -> String {
    if inner.starts_with('*') {
        format!("({inner})")
    } else {
        inner
    }
}

fn render_parameters(node: Node, src: &str) -> String {
    let mut params = Vec::new();
    let mut cursor = node.walk();
    for param in node.named_children(&mut cursor) {
        match param.kind() {
            "parameter_declaration" => {
                let specifiers = render_specifiers(param, src);
                let declarator = param
                    .child_by_field_name("declarator")
                    .map(|d| render_declarator(d, src, true))
                    .unwrap_or_default();
                params.push(combine(&specifiers, &declarator));
            }
            "variadic_parameter" => params.push("...".to_string()),
            "comment" => {}
            _ => params.push(squash(text(param, src))),
        }
    }
    format!("({})", params.join(", "))
}

/// Renders the type named in a cast or `sizeof`.
pub(crate) fn render_type_descriptor(node: Node, src: &str) -> String {
    let specifiers = render_specifiers(node, src);
    let declarator = node
        .child_by_field_name("declarator")
        .map(|d| render_declarator(d, src, false))
        .unwrap_or_default();
    combine(&specifiers, &declarator)
}

/// Renders an expression with canonical spacing. Parentheses are only those of the source.
pub(crate) fn render_expr(node: Node, src: &str) -> String {
    let field = |name: &str| {
        node.child_by_field_name(name)
            .map(|n| render_expr(n, src))
            .unwrap_or_default()
    };
    let operator = || {
        node.child_by_field_name("operator")
            .map(|n| text(n, src).to_string())
            .unwrap_or_default()
    };
    match node.kind() {
        "parenthesized_expression" => match first_named_child(node) {
            Some(inner) => format!("({})", render_expr(inner, src)),
            None => "()".to_string(),
        },
        "unary_expression" | "pointer_expression" => {
            format!("{}{}", operator(), field("argument"))
        }
        "binary_expression" => format!("{} {} {}", field("left"), operator(), field("right")),
        "cast_expression" => {
            let tpe = node
                .child_by_field_name("type")
                .map(|t| render_type_descriptor(t, src))
                .unwrap_or_default();
            format!("({tpe}) {}", field("value"))
        }
        "call_expression" => {
            let mut args = Vec::new();
            if let Some(list) = node.child_by_field_name("arguments") {
                let mut cursor = list.walk();
                for arg in list.named_children(&mut cursor) {
                    if arg.kind() != "comment" {
                        args.push(render_expr(arg, src));
                    }
                }
            }
            format!("{}({})", field("function"), args.join(", "))
        }
        "conditional_expression" => format!(
            "{} ? {} : {}",
            field("condition"),
            field("consequence"),
            field("alternative")
        ),
        "field_expression" => format!("{}{}{}", field("argument"), operator(), field("field")),
        _ => squash(text(node, src)),
    }
}

pub(crate) fn first_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let first = node
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment");
    first
}

/// Walks down a declarator to the identifier it declares.
pub(crate) fn declarator_name(node: Node) -> Option<Node> {
    let mut current = node;
    loop {
        match current.kind() {
            "identifier" | "type_identifier" | "field_identifier" | "primitive_type" => {
                return Some(current)
            }
            "parenthesized_declarator"
            | "parenthesized_type_declarator"
            | "attributed_declarator"
            | "attributed_type_declarator" => {
                current = first_named_child(current)?;
            }
            _ => current = current.child_by_field_name("declarator")?,
        }
    }
}

/// True if the type constructor closest to the declared name is a function, i.e. the
/// declarator declares a function rather than, e.g., a pointer to one.
pub(crate) fn declares_function(node: Node) -> bool {
    let mut current = node;
    let mut innermost = "";
    loop {
        match current.kind() {
            "identifier" | "type_identifier" | "field_identifier" | "primitive_type" => {
                return matches!(innermost, "function_declarator" | "function_type_declarator")
            }
            "parenthesized_declarator"
            | "parenthesized_type_declarator"
            | "attributed_declarator"
            | "attributed_type_declarator" => match first_named_child(current) {
                Some(inner) => current = inner,
                None => return false,
            },
            kind => {
                if kind != "init_declarator" {
                    innermost = kind;
                }
                match current.child_by_field_name("declarator") {
                    Some(inner) => current = inner,
                    None => return false,
                }
            }
        }
    }
}
