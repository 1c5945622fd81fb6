pub mod ast;
pub mod codegen;
pub mod jasmin;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod symbols;
pub mod token;
pub mod types;
