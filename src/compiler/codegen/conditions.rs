//! Branch routing for conditions.
//!
//! A condition never produces a value when it controls an `if` or `while`:
//! it jumps to the false target registered by its enclosing statement and
//! falls through when true.

use super::emit::{Comparison, Instruction, Label, MethodRef};
use super::{CodegenError, Generator};
use crate::compiler::ast::{BinOp, Expr, ExprId, ExprKind, LogicalOp};
use crate::compiler::types::SemType;
use std::collections::HashMap;

/// Side table: condition node → the label its false branch jumps to.
#[derive(Debug, Default, Clone)]
pub struct ConditionRouter {
    targets: HashMap<ExprId, Label>,
}

impl ConditionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ExprId, false_target: Label) {
        self.targets.insert(id, false_target);
    }

    pub fn target(&self, id: ExprId) -> Option<&Label> {
        self.targets.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.targets.len()
    }
}

/// The comparison a relational operator tests for.
fn comparison_for(op: BinOp) -> Option<Comparison> {
    match op {
        BinOp::Eq => Some(Comparison::Eq),
        BinOp::NotEq => Some(Comparison::Ne),
        BinOp::Gt => Some(Comparison::Gt),
        BinOp::GtEq => Some(Comparison::Ge),
        BinOp::Lt => Some(Comparison::Lt),
        BinOp::LtEq => Some(Comparison::Le),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => None,
    }
}

fn string_compare_to() -> MethodRef {
    MethodRef::new("java/lang/String", "compareTo", "(Ljava/lang/String;)I")
}

impl Generator {
    /// Generate `cond` so that control reaches `false_target` when it is
    /// false and falls through when it is true.
    pub(super) fn route(&mut self, cond: &Expr, false_target: Label) -> Result<(), CodegenError> {
        self.conditions.register(cond.id, false_target.clone());

        match &cond.kind {
            ExprKind::Binary(left, op, right) => match comparison_for(*op) {
                Some(cmp) => self.compare_and_branch(left, *op, cmp, right, false_target)?,
                None => self.branch_on_value(cond, false_target)?,
            },
            ExprKind::Logical(left, LogicalOp::And, right) => {
                self.route(left, false_target.clone())?;
                self.route(right, false_target)?;
            }
            ExprKind::Logical(left, LogicalOp::Or, right) => {
                let id = self.labels.next_id();
                let try_right = Label::numbered("OR_RHS", id);
                let taken = Label::numbered("OR_TRUE", id);
                self.route(left, try_right.clone())?;
                self.emit(Instruction::Goto(taken.clone()));
                self.place(try_right);
                self.route(right, false_target)?;
                self.place(taken);
            }
            ExprKind::Grouping(inner) => self.route(inner, false_target)?,
            _ => self.branch_on_value(cond, false_target)?,
        }

        self.types.record(cond.id, SemType::Bool);
        Ok(())
    }

    /// Push `1` when `expr` holds and `0` otherwise.
    pub(super) fn materialize_bool(&mut self, expr: &Expr) -> Result<SemType, CodegenError> {
        let id = self.labels.next_id();
        let is_false = Label::numbered("FALSE", id);
        let done = Label::numbered("BOOL_END", id);
        self.route(expr, is_false.clone())?;
        self.emit(Instruction::IConst(1));
        self.emit(Instruction::Goto(done.clone()));
        self.place(is_false);
        self.emit(Instruction::IConst(0));
        self.place(done);
        Ok(SemType::Bool)
    }

    fn compare_and_branch(
        &mut self,
        left: &Expr,
        op: BinOp,
        cmp: Comparison,
        right: &Expr,
        false_target: Label,
    ) -> Result<(), CodegenError> {
        let lt = self.gen_value(left)?;
        let rt = self.gen_value(right)?;
        if lt != rt {
            return Err(CodegenError::TypeMismatch {
                op,
                left: lt,
                right: rt,
                line: left.span.line,
            });
        }

        // The branch fires when the source comparison is false.
        let branch = cmp.negate();
        match lt {
            SemType::Numeric => {
                // fcmpg for < and <= so NaN falls to the false side.
                let fcmp = match op {
                    BinOp::Lt | BinOp::LtEq => Instruction::FCmpg,
                    _ => Instruction::FCmpl,
                };
                self.emit(fcmp);
                self.emit(Instruction::If(branch, false_target));
            }
            SemType::Str => {
                self.emit(Instruction::InvokeVirtual(string_compare_to()));
                self.emit(Instruction::If(branch, false_target));
            }
            SemType::Bool => self.emit(Instruction::IfICmp(branch, false_target)),
        }
        Ok(())
    }

    fn branch_on_value(&mut self, cond: &Expr, false_target: Label) -> Result<(), CodegenError> {
        let ty = self.gen_value(cond)?;
        if ty != SemType::Bool {
            return Err(CodegenError::NonBooleanCondition {
                found: ty,
                line: cond.span.line,
            });
        }
        self.emit(Instruction::If(Comparison::Eq, false_target));
        Ok(())
    }
}
