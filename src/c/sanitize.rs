// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Line-oriented rewriting of preprocessed GNU C into text that a strict C grammar accepts.
//!
//! Every input line produces exactly one output line, so row numbers in the sanitized text
//! are the row numbers of the preprocessor output. Together with the [`LineMap`] built from
//! the preprocessor's line markers this lets us report lines of the original benchmark.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Maps rows of the sanitized text back to the presumed lines of the original source.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    /// presumed line for every row
    rows: Vec<u32>,
}

impl LineMap {
    /// Presumed source line of the zero-based `row`. Rows we know nothing about map to `row + 1`.
    pub fn presumed_line(&self, row: usize) -> u32 {
        self.rows.get(row).copied().unwrap_or(row as u32 + 1)
    }

    fn push(&mut self, line: u32) {
        self.rows.push(line);
    }
}

/// Sanitized text together with its mapping back to source lines.
#[derive(Debug, Clone, Default)]
pub struct SanitizedSource {
    pub text: String,
    pub line_map: LineMap,
}

impl SanitizedSource {
    /// Wraps text that does not need sanitizing, rows map one-to-one onto lines.
    pub fn verbatim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line_map: LineMap::default(),
        }
    }
}

/// Sanitizes a complete preprocessed translation unit.
pub fn sanitize(input: &str) -> Result<SanitizedSource> {
    let mut sanitizer = Sanitizer::new();
    let mut text = String::with_capacity(input.len());
    for line in input.lines() {
        let rewritten = sanitizer.process_line(line)?;
        text.push_str(&rewritten);
        text.push('\n');
    }
    let line_map = sanitizer.finish()?;
    Ok(SanitizedSource { text, line_map })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructBody {
    Idle,
    /// saw `struct <name> {` and nothing but blank lines since
    AwaitingBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsmState {
    Idle,
    /// inside an asm statement that has not been closed by `);` yet
    Skipping,
}

struct Sanitizer {
    struct_body: StructBody,
    asm: AsmState,
    va_arg: BuiltinElider,
    offsetof: BuiltinElider,
    line_map: LineMap,
    row: usize,
    next_line: u32,
}

impl Sanitizer {
    fn new() -> Self {
        Self {
            struct_body: StructBody::Idle,
            asm: AsmState::Idle,
            va_arg: BuiltinElider::new(Builtin::VaArg),
            offsetof: BuiltinElider::new(Builtin::Offsetof),
            line_map: LineMap::default(),
            row: 0,
            next_line: 1,
        }
    }

    fn process_line(&mut self, line: &str) -> Result<String> {
        self.row += 1;
        self.line_map.push(self.next_line);
        self.next_line = self.next_line.saturating_add(1);

        if line.trim_start().starts_with('#') {
            self.line_directive(line);
            return Ok(String::new());
        }

        let line = normalize_keywords(line);
        let line = self.patch_struct_body(line);
        let line = self.elide_asm(line);
        let line = self.va_arg.feed(&line, self.row)?;
        self.offsetof.feed(&line, self.row)
    }

    fn line_directive(&mut self, line: &str) {
        if let Some(caps) = LINE_MARKER.captures(line) {
            // the marker names the line number of the *next* row
            if let Ok(next) = caps[1].parse::<u32>() {
                self.next_line = next;
            }
        }
    }

    fn patch_struct_body(&mut self, line: String) -> String {
        match self.struct_body {
            StructBody::AwaitingBody if STRUCT_CLOSE.is_match(&line) => {
                self.struct_body = StructBody::Idle;
                format!("int __dummy; {line}")
            }
            StructBody::AwaitingBody => {
                if !line.trim().is_empty() {
                    self.struct_body = StructBody::Idle;
                }
                line
            }
            StructBody::Idle => {
                if STRUCT_OPEN.is_match(&line) {
                    self.struct_body = StructBody::AwaitingBody;
                }
                line
            }
        }
    }

    fn elide_asm(&mut self, line: String) -> String {
        match self.asm {
            AsmState::Skipping => {
                if ASM_CLOSE.is_match(&line) {
                    self.asm = AsmState::Idle;
                }
                String::new()
            }
            AsmState::Idle => {
                // symbol renaming is not a statement, strip it before looking for statements
                let line = ASM_RENAME.replace_all(&line, "");
                if ASM_OPEN.is_match(&line) {
                    if !ASM_CLOSE.is_match(&line) {
                        self.asm = AsmState::Skipping;
                    }
                    String::new()
                } else {
                    line.into_owned()
                }
            }
        }
    }

    fn finish(self) -> Result<LineMap> {
        self.va_arg.finish()?;
        self.offsetof.finish()?;
        Ok(self.line_map)
    }
}

/// Stateless rewrites of GNU keywords and statement expressions.
fn normalize_keywords(line: &str) -> String {
    let mut out = ASSERT_STMT_EXPR.replace_all(line, "${1}").into_owned();
    for (pattern, replacement) in KEYWORDS.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

/// Compiler builtins whose argument lists the grammar cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    VaArg,
    Offsetof,
}

impl Builtin {
    fn name(self) -> &'static str {
        match self {
            Builtin::VaArg => "__builtin_va_arg",
            Builtin::Offsetof => "__builtin_offsetof",
        }
    }

    fn opener(self) -> &'static Regex {
        match self {
            Builtin::VaArg => &*VA_ARG_OPEN,
            Builtin::Offsetof => &*OFFSETOF_OPEN,
        }
    }

    /// Replacement for the whole call given the text between its parentheses.
    fn rewrite(self, args: &str) -> String {
        match self {
            // drop the type argument
            Builtin::VaArg => {
                let list = args.split(',').next().unwrap_or("").trim();
                format!("__builtin_va_arg({list})")
            }
            Builtin::Offsetof => "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ElisionState {
    Idle,
    Collecting {
        depth: u32,
        args: String,
        opened_at: usize,
    },
}

/// Collapses one builtin call, which the preprocessor may have spread over several lines.
///
/// The text in front of the call stays on the opening line, continuation lines turn blank and
/// the replacement followed by the remainder of the closing line is emitted on the closing line.
#[derive(Debug)]
struct BuiltinElider {
    builtin: Builtin,
    state: ElisionState,
}

impl BuiltinElider {
    fn new(builtin: Builtin) -> Self {
        Self {
            builtin,
            state: ElisionState::Idle,
        }
    }

    fn feed(&mut self, line: &str, row: usize) -> Result<String> {
        let mut out = String::new();
        let mut rest = line;
        loop {
            match &mut self.state {
                ElisionState::Idle => match self.builtin.opener().find(rest) {
                    None => {
                        out.push_str(rest);
                        return Ok(out);
                    }
                    Some(m) => {
                        out.push_str(&rest[..m.start()]);
                        rest = &rest[m.end()..];
                        self.state = ElisionState::Collecting {
                            depth: 1,
                            args: String::new(),
                            opened_at: row,
                        };
                    }
                },
                ElisionState::Collecting {
                    depth,
                    args,
                    opened_at,
                } => {
                    let mut closed_at = None;
                    for (ii, cc) in rest.char_indices() {
                        match cc {
                            '(' => *depth += 1,
                            ')' => {
                                *depth -= 1;
                                if *depth == 0 {
                                    closed_at = Some(ii);
                                    break;
                                }
                            }
                            ';' | '{' | '}' => {
                                return Err(Error::InternalConsistency(format!(
                                    "unexpected `{cc}` on line {row} inside the argument list of `{}` opened on line {opened_at}: {line}",
                                    self.builtin.name()
                                )));
                            }
                            _ => {}
                        }
                        args.push(cc);
                    }
                    match closed_at {
                        Some(ii) => {
                            out.push_str(&self.builtin.rewrite(args));
                            rest = &rest[ii + 1..];
                            self.state = ElisionState::Idle;
                        }
                        None => {
                            // the argument list continues on the next line
                            args.push(' ');
                            return Ok(out);
                        }
                    }
                }
            }
        }
    }

    fn finish(&self) -> Result<()> {
        match &self.state {
            ElisionState::Idle => Ok(()),
            ElisionState::Collecting { opened_at, .. } => Err(Error::InternalConsistency(format!(
                "argument list of `{}` opened on line {opened_at} is never closed",
                self.builtin.name()
            ))),
        }
    }
}

lazy_static! {
    static ref LINE_MARKER: Regex = Regex::new(r"^\s*#\s*(?:line\s+)?(\d+)\b").unwrap();
    static ref ASSERT_STMT_EXPR: Regex = Regex::new(
        r#"__extension__\s*\(\{\s*if\s*\(0\)\s*;\s*else\s+(__assert_fail\s*\("0",\s*".*",\s*\d+,\s*__extension__\s+__PRETTY_FUNCTION__\s*\));\s*\}\)"#
    )
    .unwrap();
    static ref KEYWORDS: Vec<(Regex, &'static str)> = [
        (r"\b__extension__\b", ""),
        (r"\b__thread\b", ""),
        (r"\b__restrict(?:__)?\b", "restrict"),
        (r"\b__inline(?:__)?\b", "inline"),
        (r"\b__const(?:__)?\b", "const"),
        (r"\b__signed__\b", "signed"),
        (r"\b__volatile__\b", "volatile"),
        (r"\b__builtin_va_list\b", "int"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect();
    static ref STRUCT_OPEN: Regex = Regex::new(r"^\s*struct\s+[a-zA-Z0-9_]+\s*\{\s*$").unwrap();
    static ref STRUCT_CLOSE: Regex = Regex::new(r"^\s*\}\s*;\s*$").unwrap();
    static ref ASM_OPEN: Regex =
        Regex::new(r"^\s*(?:__asm__|__asm|asm)(?:\s+(?:volatile|goto|inline))*\s*\(").unwrap();
    static ref ASM_CLOSE: Regex = Regex::new(r"\)\s*;\s*$").unwrap();
    static ref ASM_RENAME: Regex = Regex::new(r#"__asm__\s*\(""\s+"[a-zA-Z0-9_]+"\)"#).unwrap();
    static ref VA_ARG_OPEN: Regex = Regex::new(r"\b__builtin_va_arg\s*\(").unwrap();
    static ref OFFSETOF_OPEN: Regex = Regex::new(r"\b__builtin_offsetof\s*\(").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(input: &str) -> String {
        sanitize(input).unwrap().text
    }

    #[test]
    fn plain_c_is_untouched() {
        let src = "int main(void) {\n  int x = 3;\n  return x;\n}\n";
        assert_eq!(text(src), src);
        assert_eq!(text(&text(src)), src);
    }

    #[test]
    fn gnu_keywords() {
        assert_eq!(
            text("__extension__ typedef __signed__ char __int8_t;\n"),
            " typedef signed char __int8_t;\n"
        );
        assert_eq!(
            text("static __inline__ int f(char *__restrict s, __const char *t);\n"),
            "static inline int f(char *restrict s, const char *t);\n"
        );
        assert_eq!(text("typedef __builtin_va_list va_list;\n"), "typedef int va_list;\n");
        // word boundaries are respected
        assert_eq!(text("int __constant = 1;\n"), "int __constant = 1;\n");
    }

    #[test]
    fn assert_statement_expression() {
        let line = r#"  __extension__ ({ if (0) ; else __assert_fail ("0", "test.c", 12, __extension__ __PRETTY_FUNCTION__); });"#;
        assert_eq!(
            text(line),
            "  __assert_fail (\"0\", \"test.c\", 12,  __PRETTY_FUNCTION__);\n"
        );
    }

    #[test]
    fn empty_struct_gets_a_member() {
        assert_eq!(text("struct Foo {\n};\n"), "struct Foo {\nint __dummy; };\n");
        assert_eq!(
            text("struct Foo {\n\n};\n"),
            "struct Foo {\n\nint __dummy; };\n"
        );
        // non-empty struct is left alone
        let src = "struct Foo {\n  int a;\n};\n";
        assert_eq!(text(src), src);
    }

    #[test]
    fn multi_line_asm_is_blanked() {
        let src = "int x;\n__asm__ volatile(\"movl $1, %%eax\"\n  \"nop\"\n  : : : \"memory\");\nint y;\n";
        assert_eq!(text(src), "int x;\n\n\n\nint y;\n");
    }

    #[test]
    fn single_line_asm_is_blanked() {
        assert_eq!(text("  __asm__ (\"nop\");\n"), "\n");
        assert_eq!(text("  asm volatile (\"\" ::: \"memory\");\n"), "\n");
    }

    #[test]
    fn asm_rename_is_stripped() {
        assert_eq!(
            text("extern int foo(int) __asm__ (\"\" \"foo64\");\n"),
            "extern int foo(int) ;\n"
        );
        // a renaming annotation on its own line must not swallow the `;`
        assert_eq!(
            text("extern int foo(int)\n     __asm__ (\"\" \"foo64\");\n"),
            "extern int foo(int)\n     ;\n"
        );
    }

    #[test]
    fn va_arg_drops_the_type() {
        assert_eq!(
            text("  x = __builtin_va_arg(ap, int);\n"),
            "  x = __builtin_va_arg(ap);\n"
        );
        assert_eq!(
            text("  x = __builtin_va_arg(ap,\n      int);\n"),
            "  x = \n__builtin_va_arg(ap);\n"
        );
    }

    #[test]
    fn offsetof_becomes_zero() {
        assert_eq!(
            text("  return __builtin_offsetof(struct s, m) + 1;\n"),
            "  return 0 + 1;\n"
        );
        assert_eq!(
            text("  n = __builtin_offsetof (struct s,\n\n   inner.m);\n"),
            "  n = \n\n0;\n"
        );
    }

    #[test]
    fn unexpected_continuation_is_fatal() {
        let res = sanitize("  n = __builtin_offsetof(struct s,\n}\n");
        assert!(matches!(res, Err(Error::InternalConsistency(_))));
        let res = sanitize("  x = __builtin_va_arg(ap,\n");
        assert!(matches!(res, Err(Error::InternalConsistency(_))));
    }

    #[test]
    fn line_markers() {
        let src = "# 1 \"a.c\"\nint x;\n# 10 \"a.c\"\nint y;\n#pragma once\nint z;\n";
        let out = sanitize(src).unwrap();
        assert_eq!(out.text, "\nint x;\n\nint y;\n\nint z;\n");
        assert_eq!(out.line_map.presumed_line(1), 1);
        assert_eq!(out.line_map.presumed_line(3), 10);
        assert_eq!(out.line_map.presumed_line(5), 12);
        // rows past the end fall back to row numbers
        assert_eq!(out.line_map.presumed_line(100), 101);
    }

    #[test]
    fn line_count_is_preserved() {
        let src = "struct A {\n};\n__asm__(\"a\"\n\"b\");\nx = __builtin_va_arg(a,\nint);\n";
        let out = text(src);
        assert_eq!(out.lines().count(), src.lines().count());
    }
}
