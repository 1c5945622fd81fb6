pub mod compiler;
pub mod driver;
pub mod manifest;

use compiler::ast::Program;
use compiler::codegen::emit::Assembly;
use compiler::codegen::{CodegenError, Generator};
use compiler::lexer::{LexError, Lexer};
use compiler::parser::{ParseError, Parser};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{}", join_lines(.0))]
    Parse(Vec<ParseError>),
    #[error("{}", describe_codegen(.0))]
    Codegen(#[from] CodegenError),
    #[error("cannot serialize AST: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn join_lines(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_codegen(err: &CodegenError) -> String {
    match err.line() {
        Some(line) => format!("codegen error at line {}: {}", line, err),
        None => format!("codegen error: {}", err),
    }
}

impl CompileError {
    /// One line-tagged diagnostic per underlying error.
    pub fn diagnostics(&self) -> Vec<CompilerDiagnostic> {
        match self {
            CompileError::Lex(e) => {
                vec![CompilerDiagnostic::error(e.message.clone(), Some(e.span.line))]
            }
            CompileError::Parse(errs) => errs
                .iter()
                .map(|e| CompilerDiagnostic::error(e.message.clone(), Some(e.span.line)))
                .collect(),
            CompileError::Codegen(e) => vec![CompilerDiagnostic::error(e.to_string(), e.line())],
            CompileError::Serialize(e) => vec![CompilerDiagnostic::error(e.to_string(), None)],
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Diagnostics API (for editors and tooling)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerDiagnostic {
    pub message: String,
    pub line: Option<u32>,
    pub severity: DiagnosticSeverity,
}

impl CompilerDiagnostic {
    fn error(message: String, line: Option<u32>) -> Self {
        Self {
            message,
            line,
            severity: DiagnosticSeverity::Error,
        }
    }
}

/// Run lex → parse → codegen and return structured diagnostics.
///
/// Always succeeds; an empty vector means the program compiles.
pub fn check_diagnostics(source: &str) -> Vec<CompilerDiagnostic> {
    match check(source) {
        Ok(()) => Vec::new(),
        Err(e) => e.diagnostics(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Public API
// ═══════════════════════════════════════════════════════════════

pub fn parse_source(source: &str) -> Result<Program, CompileError> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse_program().map_err(CompileError::Parse)
}

/// Compile dam source to a verified instruction stream with frame limits.
pub fn compile_to_assembly(source: &str) -> Result<Assembly, CompileError> {
    let program = parse_source(source)?;
    let mut generator = Generator::new();
    generator.generate(&program)?;
    Ok(generator.finish()?)
}

/// Compile dam source to a complete Jasmin class named `class_name`.
pub fn compile_to_jasmin(
    source: &str,
    class_name: &str,
    source_file: Option<&str>,
) -> Result<String, CompileError> {
    let assembly = compile_to_assembly(source)?;
    Ok(compiler::jasmin::render_class(class_name, source_file, &assembly))
}

/// Run the whole pass without producing output.
pub fn check(source: &str) -> Result<(), CompileError> {
    compile_to_assembly(source).map(|_| ())
}

/// Parse dam source and return the AST as a JSON string.
pub fn source_to_ast_json(source: &str) -> Result<String, CompileError> {
    let program = parse_source(source)?;
    Ok(serde_json::to_string_pretty(&program)?)
}
