use super::emit::{Instruction, Label, MethodRef};
use super::{CodegenError, Generator};
use crate::compiler::ast::*;
use crate::compiler::types::SemType;

const SYSTEM_OUT: Instruction = Instruction::GetStatic {
    field: "java/lang/System/out",
    descriptor: "Ljava/io/PrintStream;",
};

const SYSTEM_IN: Instruction = Instruction::GetStatic {
    field: "java/lang/System/in",
    descriptor: "Ljava/io/InputStream;",
};

const SCANNER: &str = "java/util/Scanner";

/// `new Scanner(System.in)` into `slot`. Runs once at the top of `main`,
/// so every `read` consumes the next line from the same buffer.
pub(super) fn scanner_prologue(slot: u16) -> [Instruction; 5] {
    [
        Instruction::New(SCANNER),
        Instruction::Dup,
        SYSTEM_IN,
        Instruction::InvokeSpecial(MethodRef::new(
            SCANNER,
            "<init>",
            "(Ljava/io/InputStream;)V",
        )),
        Instruction::StoreRef(slot),
    ]
}

impl Generator {
    pub(super) fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Let(s) => self.gen_let(s),
            Stmt::Print(s) => self.gen_print(s),
            Stmt::Read(s) => self.gen_read(s),
            Stmt::If(s) => self.gen_if(s),
            Stmt::While(s) => self.gen_while(s),
            Stmt::Block(s) => {
                for inner in &s.stmts {
                    self.gen_stmt(inner)?;
                }
                Ok(())
            }
            Stmt::Expression(s) => self.gen_expr_stmt(s),
        }
    }

    fn gen_let(&mut self, s: &LetStmt) -> Result<(), CodegenError> {
        let ty = self.gen_value(&s.initializer)?;
        let slot = self
            .symbols
            .define(&s.name, ty)
            .map_err(|e| CodegenError::frame_full(e, s.span))?;
        self.emit(Instruction::Store(ty, slot));
        Ok(())
    }

    fn gen_print(&mut self, s: &PrintStmt) -> Result<(), CodegenError> {
        self.emit(SYSTEM_OUT);
        let ty = self.gen_value(&s.value)?;
        self.emit(Instruction::InvokeVirtual(MethodRef::new(
            "java/io/PrintStream",
            "println",
            format!("({})V", ty.descriptor()),
        )));
        Ok(())
    }

    fn gen_read(&mut self, s: &ReadStmt) -> Result<(), CodegenError> {
        // Checked up front so an undeclared target emits nothing.
        self.symbols
            .index(&s.name)
            .map_err(|e| CodegenError::undefined(e, s.span))?;

        let scanner = self
            .symbols
            .scanner_slot()
            .map_err(|e| CodegenError::frame_full(e, s.span))?;

        self.emit(Instruction::LoadRef(scanner));
        self.emit(Instruction::InvokeVirtual(MethodRef::new(
            SCANNER,
            "nextLine",
            "()Ljava/lang/String;",
        )));
        let slot = self
            .symbols
            .assign(&s.name, SemType::Str)
            .map_err(|e| CodegenError::undefined(e, s.span))?;
        self.emit(Instruction::Store(SemType::Str, slot));
        Ok(())
    }

    fn gen_if(&mut self, s: &IfStmt) -> Result<(), CodegenError> {
        let id = self.labels.next_id();
        let then_label = Label::numbered("THEN", id);
        let else_label = Label::numbered("ELSE", id);
        let end_label = Label::numbered("END", id);

        let false_target = if s.else_branch.is_some() {
            else_label.clone()
        } else {
            end_label.clone()
        };
        self.route(&s.condition, false_target)?;

        self.place(then_label);
        self.gen_stmt(&s.then_branch)?;

        if let Some(else_branch) = &s.else_branch {
            self.emit(Instruction::Goto(end_label.clone()));
            self.place(else_label);
            self.gen_stmt(else_branch)?;
        }

        self.place(end_label);
        Ok(())
    }

    fn gen_while(&mut self, s: &WhileStmt) -> Result<(), CodegenError> {
        let id = self.labels.next_id();
        let start_label = Label::numbered("LOOP_START", id);
        let end_label = Label::numbered("LOOP_END", id);

        self.place(start_label.clone());
        self.route(&s.condition, end_label.clone())?;
        self.gen_stmt(&s.body)?;
        self.emit(Instruction::Goto(start_label));
        self.place(end_label);
        Ok(())
    }

    fn gen_expr_stmt(&mut self, s: &ExprStmt) -> Result<(), CodegenError> {
        match &s.expr.kind {
            // The store consumes the value; nothing is left to discard.
            ExprKind::Assign(name, value) => {
                let ty = self.gen_assign(&s.expr, name, value, false)?;
                self.types.record(s.expr.id, ty);
            }
            _ => {
                self.gen_value(&s.expr)?;
                self.emit(Instruction::Pop);
            }
        }
        Ok(())
    }
}
