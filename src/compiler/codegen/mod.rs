//! JVM code generation for the dam language.
//!
//! One depth-first pass over the AST infers every expression's type and
//! emits Jasmin instructions at the same time. There is no separate type
//! checker: a type error is found at the node that causes it, and
//! generation stops there.

use crate::compiler::ast::{BinOp, ExprId, Program, UnaryOp};
use crate::compiler::span::Span;
use crate::compiler::symbols::{FrameFull, SymbolTable, UndefinedVariable};
use crate::compiler::types::{SemType, TypeTracker};
use thiserror::Error;

pub mod conditions;
pub mod emit;
mod expressions;
mod statements;

use conditions::ConditionRouter;
use emit::{Assembly, Emitter, Instruction, Item, Label, LabelAllocator, LinkError};

// ═══════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, line: u32 },
    #[error("type mismatch: cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: BinOp,
        left: SemType,
        right: SemType,
        line: u32,
    },
    #[error("invalid operand for '{op}': {operand}")]
    InvalidOperand {
        op: UnaryOp,
        operand: SemType,
        line: u32,
    },
    #[error("condition must be bool, found {found}")]
    NonBooleanCondition { found: SemType, line: u32 },
    #[error("'null' has no type")]
    UntypedNull { line: u32 },
    #[error("too many variables: the frame is limited to {} locals", u16::MAX)]
    TooManyLocals { line: u32 },
    #[error("invalid instruction stream: {0}")]
    UnresolvedLabel(#[from] LinkError),
}

impl CodegenError {
    pub(crate) fn undefined(err: UndefinedVariable, span: Span) -> Self {
        CodegenError::UndefinedVariable {
            name: err.0,
            line: span.line,
        }
    }

    pub(crate) fn frame_full(_: FrameFull, span: Span) -> Self {
        CodegenError::TooManyLocals { line: span.line }
    }

    /// Source line the error was detected on, when it has one.
    pub fn line(&self) -> Option<u32> {
        match self {
            CodegenError::UndefinedVariable { line, .. }
            | CodegenError::TypeMismatch { line, .. }
            | CodegenError::InvalidOperand { line, .. }
            | CodegenError::NonBooleanCondition { line, .. }
            | CodegenError::UntypedNull { line }
            | CodegenError::TooManyLocals { line } => Some(*line),
            CodegenError::UnresolvedLabel(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Generator
// ═══════════════════════════════════════════════════════════════

/// Single-pass generator. All state lives in the tables below and is only
/// ever added to while the pass runs.
#[derive(Debug, Default)]
pub struct Generator {
    symbols: SymbolTable,
    types: TypeTracker,
    labels: LabelAllocator,
    conditions: ConditionRouter,
    emitter: Emitter,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate every statement in order, stopping at the first error.
    /// Instructions emitted before a failure stay visible through
    /// [`Generator::items`].
    pub fn generate(&mut self, program: &Program) -> Result<(), CodegenError> {
        tracing::debug!(statements = program.stmts.len(), "generating code");
        for stmt in &program.stmts {
            self.gen_stmt(stmt)?;
        }
        tracing::debug!(
            items = self.emitter.len(),
            variables = self.symbols.slot_count(),
            typed_nodes = self.types.len(),
            conditions = self.conditions.len(),
            "code generation finished"
        );
        Ok(())
    }

    /// Open the shared scanner if any `read` needs it, then verify the
    /// stream and size the frame.
    pub fn finish(mut self) -> Result<Assembly, CodegenError> {
        if let Some(slot) = self.symbols.scanner() {
            self.emitter.prepend(statements::scanner_prologue(slot));
        }
        let locals = self.symbols.frame_locals();
        Ok(self.emitter.finish(locals)?)
    }

    pub fn items(&self) -> &[Item] {
        self.emitter.items()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.emitter.items().iter().filter_map(Item::as_op)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn type_of(&self, id: ExprId) -> Option<SemType> {
        self.types.get(id)
    }

    pub fn condition_target(&self, id: ExprId) -> Option<&Label> {
        self.conditions.target(id)
    }

    fn emit(&mut self, ins: Instruction) {
        self.emitter.emit(ins);
    }

    fn place(&mut self, label: Label) {
        self.emitter.place(label);
    }
}

/// Compile a whole program to a finished instruction stream.
pub fn generate(program: &Program) -> Result<Assembly, CodegenError> {
    let mut generator = Generator::new();
    generator.generate(program)?;
    generator.finish()
}
