use super::emit::{Instruction, MethodRef};
use super::{CodegenError, Generator};
use crate::compiler::ast::*;
use crate::compiler::types::SemType;

fn string_concat() -> MethodRef {
    MethodRef::new(
        "java/lang/String",
        "concat",
        "(Ljava/lang/String;)Ljava/lang/String;",
    )
}

impl Generator {
    /// Leave the value of `expr` on the operand stack and record its type.
    pub(super) fn gen_value(&mut self, expr: &Expr) -> Result<SemType, CodegenError> {
        let ty = match &expr.kind {
            ExprKind::Literal(lit) => self.gen_literal(lit, expr)?,
            ExprKind::Variable(name) => {
                let ty = self
                    .symbols
                    .get(name)
                    .map_err(|e| CodegenError::undefined(e, expr.span))?;
                let slot = self
                    .symbols
                    .index(name)
                    .map_err(|e| CodegenError::undefined(e, expr.span))?;
                self.emit(Instruction::Load(ty, slot));
                ty
            }
            ExprKind::Assign(name, value) => self.gen_assign(expr, name, value, true)?,
            ExprKind::Unary(op, operand) => self.gen_unary(*op, operand)?,
            ExprKind::Binary(left, op, right) if op.is_arithmetic() => {
                self.gen_arithmetic(left, *op, right)?
            }
            ExprKind::Binary(..) | ExprKind::Logical(..) => self.materialize_bool(expr)?,
            ExprKind::Grouping(inner) => self.gen_value(inner)?,
        };
        Ok(self.types.record(expr.id, ty))
    }

    fn gen_literal(&mut self, lit: &Literal, expr: &Expr) -> Result<SemType, CodegenError> {
        match lit {
            Literal::Number(n) => {
                self.emit(Instruction::LdcFloat(*n));
                Ok(SemType::Numeric)
            }
            Literal::Str(s) => {
                self.emit(Instruction::LdcString(s.clone()));
                Ok(SemType::Str)
            }
            Literal::Bool(b) => {
                self.emit(Instruction::IConst(u8::from(*b)));
                Ok(SemType::Bool)
            }
            Literal::Null => Err(CodegenError::UntypedNull {
                line: expr.span.line,
            }),
        }
    }

    /// Store into an existing variable. With `keep_value` the assigned
    /// value also stays on the stack as the expression's result.
    pub(super) fn gen_assign(
        &mut self,
        expr: &Expr,
        name: &str,
        value: &Expr,
        keep_value: bool,
    ) -> Result<SemType, CodegenError> {
        let ty = self.gen_value(value)?;
        let slot = self
            .symbols
            .assign(name, ty)
            .map_err(|e| CodegenError::undefined(e, expr.span))?;
        if keep_value {
            self.emit(Instruction::Dup);
        }
        self.emit(Instruction::Store(ty, slot));
        Ok(ty)
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<SemType, CodegenError> {
        let ty = self.gen_value(operand)?;
        match (op, ty) {
            (UnaryOp::Not, SemType::Bool) => {
                self.emit(Instruction::IConst(1));
                self.emit(Instruction::IXor);
                Ok(SemType::Bool)
            }
            (UnaryOp::Neg, SemType::Numeric) => {
                self.emit(Instruction::FNeg);
                Ok(SemType::Numeric)
            }
            _ => Err(CodegenError::InvalidOperand {
                op,
                operand: ty,
                line: operand.span.line,
            }),
        }
    }

    fn gen_arithmetic(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
    ) -> Result<SemType, CodegenError> {
        let lt = self.gen_value(left)?;
        let rt = self.gen_value(right)?;
        let ins = match (op, lt, rt) {
            (_, l, r) if l != r => None,
            (BinOp::Add, SemType::Numeric, _) => Some(Instruction::FAdd),
            (BinOp::Sub, SemType::Numeric, _) => Some(Instruction::FSub),
            (BinOp::Mul, SemType::Numeric, _) => Some(Instruction::FMul),
            (BinOp::Div, SemType::Numeric, _) => Some(Instruction::FDiv),
            (BinOp::Add, SemType::Str, _) => Some(Instruction::InvokeVirtual(string_concat())),
            _ => None,
        };
        match ins {
            Some(ins) => {
                self.emit(ins);
                Ok(lt)
            }
            None => Err(CodegenError::TypeMismatch {
                op,
                left: lt,
                right: rt,
                line: left.span.line,
            }),
        }
    }
}
