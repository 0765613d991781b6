#![allow(dead_code)]
use std::fs;

use wabbitc::ast::Program;
use wabbitc::diag::Diagnostics;
use wabbitc::{lexer, parser};

pub const WORKLOADS: [(&str, &str); 2] = [
    ("fib", "tests/programs/fib/program.wb"),
    ("mandel", "tests/programs/bench_mandel/program.wb"),
];

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_program(path: &str) -> Program {
    let source = load_source(path);
    let mut diags = Diagnostics::new(path);
    let tokens = lexer::tokenize(&source, &mut diags);
    let program = parser::parse_tokens(tokens, &mut diags);
    assert!(!diags.has_errors(), "frontend errors in {path}: {diags}");
    program
}
