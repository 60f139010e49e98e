// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod frontend;
mod preprocess;
mod render;
mod sanitize;

pub use frontend::{
    CFrontend, CallSite, FunctionDecl, FunctionDef, LocalDecl, ParseFailure, Statement,
    Statements, TranslationUnit, TreeSitterFrontend, TypedefDecl, FRAGMENT_FUNCTION,
};
pub use preprocess::{preprocess, DEFAULT_PREPROCESSOR};
pub use sanitize::{sanitize, LineMap, SanitizedSource};
