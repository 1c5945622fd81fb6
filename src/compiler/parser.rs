use crate::compiler::ast::*;
use crate::compiler::span::Span;
use crate::compiler::token::{Token, TokenKind};
use std::fmt;

// ═══════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.span, self.message)
    }
}

impl std::error::Error for ParseError {}

// ═══════════════════════════════════════════════════════════════
//  Parser
// ═══════════════════════════════════════════════════════════════

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream.
    ///
    /// Errors do not stop the parse: the parser skips to the next statement
    /// boundary and keeps going, so every syntax error in the file is
    /// reported at once.
    pub fn parse_program(&mut self) -> Result<Program, Vec<ParseError>> {
        let start = self.current_span();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if let Some(stmt) = self.parse_declaration_recovering() {
                stmts.push(stmt);
            }
        }

        if !self.errors.is_empty() {
            return Err(std::mem::take(&mut self.errors));
        }

        tracing::debug!(statements = stmts.len(), nodes = self.next_id, "parsed program");
        Ok(Program {
            stmts,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_declaration_recovering(&mut self) -> Option<Stmt> {
        match self.parse_declaration() {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    /// Skip tokens until just after a `;` or just before a statement keyword.
    fn synchronize(&mut self) {
        if !self.check(&TokenKind::Eof) {
            self.advance();
        }
        while !self.check(&TokenKind::Eof) {
            if self.prev_kind() == TokenKind::Semicolon {
                return;
            }
            if self.peek_kind().starts_statement() {
                return;
            }
            self.advance();
        }
    }

    // ── Statements ───────────────────────────────────────────

    fn parse_declaration(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::Let) {
            return self.parse_let_stmt();
        }
        self.parse_stmt()
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Print => self.parse_print_stmt(),
            TokenKind::Read => self.parse_read_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Let => Err(self.error("'let' is only allowed at statement level, not as a branch body")),
            kind @ (TokenKind::For | TokenKind::Return | TokenKind::To) => {
                Err(self.error(&format!("'{}' is a reserved keyword", kind)))
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::Let)?;
        let name_span = self.current_span();
        let name = self.expect_ident()?;

        let initializer = if self.check(&TokenKind::Eq) {
            self.advance();
            self.parse_expr()?
        } else {
            // `let x;` starts out as the empty string
            self.make_expr(ExprKind::Literal(Literal::Str(String::new())), name_span)
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::Let(LetStmt {
            name,
            initializer,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_print_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::Print)?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Print(PrintStmt {
            value,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_read_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::Read)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Read(ReadStmt {
            name,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;

        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };

        Ok(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);

        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            if let Some(stmt) = self.parse_declaration_recovering() {
                stmts.push(stmt);
            }
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(Stmt::Block(BlockStmt {
            stmts,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current_span();
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Expression(ExprStmt {
            expr,
            span: start.merge(self.prev_span()),
        }))
    }

    // ── Expressions ──────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and binds loosest.
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_expr_bp(0)?;

        if self.check(&TokenKind::Eq) {
            let eq_span = self.advance().span;
            let value = self.parse_assignment()?;
            return match target.kind {
                ExprKind::Variable(name) => {
                    let span = target.span.merge(value.span);
                    Ok(self.make_expr(ExprKind::Assign(name, Box::new(value)), span))
                }
                _ => Err(ParseError {
                    message: "invalid assignment target".to_string(),
                    span: eq_span,
                }),
            };
        }

        Ok(target)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some(op) = self.peek_infix() {
            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr_bp(r_bp)?;
            let span = lhs.span.merge(rhs.span);
            let kind = match op {
                Infix::Logical(op) => ExprKind::Logical(Box::new(lhs), op, Box::new(rhs)),
                Infix::Binary(op) => ExprKind::Binary(Box::new(lhs), op, Box::new(rhs)),
            };
            lhs = self.make_expr(kind, span);
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        Ok(self.make_expr(ExprKind::Unary(op, Box::new(operand)), span))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_span();

        let kind = match self.peek_kind() {
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::Number(n) => ExprKind::Literal(Literal::Number(n)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::Str(s)),
            TokenKind::Ident(name) => ExprKind::Variable(name),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                let span = start.merge(self.prev_span());
                return Ok(self.make_expr(ExprKind::Grouping(Box::new(inner)), span));
            }
            _ => {
                return Err(self.error(&format!(
                    "expected expression, found '{}'",
                    self.peek_kind()
                )))
            }
        };

        self.advance();
        Ok(self.make_expr(kind, start))
    }

    fn make_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        Expr { id, kind, span }
    }

    fn peek_infix(&self) -> Option<Infix> {
        let op = match self.peek_kind() {
            TokenKind::Or => Infix::Logical(LogicalOp::Or),
            TokenKind::And => Infix::Logical(LogicalOp::And),
            TokenKind::EqEq => Infix::Binary(BinOp::Eq),
            TokenKind::NotEq => Infix::Binary(BinOp::NotEq),
            TokenKind::Gt => Infix::Binary(BinOp::Gt),
            TokenKind::GtEq => Infix::Binary(BinOp::GtEq),
            TokenKind::Lt => Infix::Binary(BinOp::Lt),
            TokenKind::LtEq => Infix::Binary(BinOp::LtEq),
            TokenKind::Plus => Infix::Binary(BinOp::Add),
            TokenKind::Minus => Infix::Binary(BinOp::Sub),
            TokenKind::Star => Infix::Binary(BinOp::Mul),
            TokenKind::Slash => Infix::Binary(BinOp::Div),
            _ => return None,
        };
        Some(op)
    }

    // ── Token utilities ──────────────────────────────────────

    fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn prev_kind(&self) -> TokenKind {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::synthetic())
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or(Span::synthetic())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, self.prev_span()));
        if !tok.kind.is_eof() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!(
                "expected '{}', found '{}'",
                kind,
                self.peek_kind()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!(
                "expected variable name, found '{}'",
                self.peek_kind()
            ))),
        }
    }

    fn error(&self, msg: &str) -> ParseError {
        ParseError {
            message: msg.to_string(),
            span: self.current_span(),
        }
    }
}

// ── Operator binding power (precedence) ──────────────────────

#[derive(Debug, Clone, Copy)]
enum Infix {
    Logical(LogicalOp),
    Binary(BinOp),
}

impl Infix {
    /// Returns (left_bp, right_bp). Higher = tighter binding.
    /// Left < Right gives left-associativity.
    fn binding_power(self) -> (u8, u8) {
        match self {
            Infix::Logical(LogicalOp::Or) => (1, 2),
            Infix::Logical(LogicalOp::And) => (3, 4),
            Infix::Binary(BinOp::Eq | BinOp::NotEq) => (5, 6),
            Infix::Binary(BinOp::Gt | BinOp::GtEq | BinOp::Lt | BinOp::LtEq) => (7, 8),
            Infix::Binary(BinOp::Add | BinOp::Sub) => (9, 10),
            Infix::Binary(BinOp::Mul | BinOp::Div) => (11, 12),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    fn parse_errors(input: &str) -> Vec<ParseError> {
        let tokens = Lexer::new(input).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap_err()
    }

    fn first_expr(prog: &Program) -> &Expr {
        match &prog.stmts[0] {
            Stmt::Print(p) => &p.value,
            Stmt::Expression(e) => &e.expr,
            Stmt::Let(l) => &l.initializer,
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_empty_program() {
        assert!(parse("").stmts.is_empty());
    }

    #[test]
    fn test_let_without_initializer_defaults_to_empty_string() {
        let prog = parse("let name;");
        match &prog.stmts[0] {
            Stmt::Let(l) => {
                assert_eq!(l.name, "name");
                assert!(matches!(
                    &l.initializer.kind,
                    ExprKind::Literal(Literal::Str(s)) if s.is_empty()
                ));
            }
            _ => panic!("expected let"),
        }
    }

    #[test]
    fn test_operator_precedence() {
        let prog = parse("print 1 + 2 * 3;");
        match &first_expr(&prog).kind {
            ExprKind::Binary(_, BinOp::Add, rhs) => {
                assert!(matches!(rhs.kind, ExprKind::Binary(_, BinOp::Mul, _)));
            }
            other => panic!("expected addition at top level, got {:?}", other),
        }
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        let prog = parse("print 8 - 4 - 2;");
        match &first_expr(&prog).kind {
            ExprKind::Binary(lhs, BinOp::Sub, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Binary(_, BinOp::Sub, _)));
                assert!(matches!(rhs.kind, ExprKind::Literal(Literal::Number(n)) if n == 2.0));
            }
            other => panic!("expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_binds_looser_than_comparison() {
        let prog = parse("print a < b or c and d == e;");
        match &first_expr(&prog).kind {
            ExprKind::Logical(lhs, LogicalOp::Or, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Binary(_, BinOp::Lt, _)));
                assert!(matches!(rhs.kind, ExprKind::Logical(_, LogicalOp::And, _)));
            }
            other => panic!("expected or, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let prog = parse("a = b = 1;");
        match &first_expr(&prog).kind {
            ExprKind::Assign(name, value) => {
                assert_eq!(name, "a");
                assert!(matches!(&value.kind, ExprKind::Assign(n, _) if n == "b"));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_grouping_node_is_kept() {
        let prog = parse("print (1 + 2) * 3;");
        match &first_expr(&prog).kind {
            ExprKind::Binary(lhs, BinOp::Mul, _) => {
                assert!(matches!(lhs.kind, ExprKind::Grouping(_)));
            }
            other => panic!("expected multiplication, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_subexpressions_get_distinct_ids() {
        let prog = parse("print x + x;");
        match &first_expr(&prog).kind {
            ExprKind::Binary(lhs, _, rhs) => assert_ne!(lhs.id, rhs.id),
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_and_while() {
        let prog = parse("if (x > 1) print x; else { print 0; } while (x < 3) x = x + 1;");
        assert_eq!(prog.stmts.len(), 2);
        match &prog.stmts[0] {
            Stmt::If(s) => {
                assert!(matches!(*s.then_branch, Stmt::Print(_)));
                assert!(matches!(s.else_branch.as_deref(), Some(Stmt::Block(_))));
            }
            _ => panic!("expected if"),
        }
        assert!(matches!(prog.stmts[1], Stmt::While(_)));
    }

    #[test]
    fn test_read_statement() {
        let prog = parse("let s; read s;");
        assert!(matches!(&prog.stmts[1], Stmt::Read(r) if r.name == "s"));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let errors = parse_errors("1 = 2;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("invalid assignment target"));
    }

    #[test]
    fn test_recovers_and_reports_every_error() {
        let errors = parse_errors("let = 1;\nprint 2;\nprint ;\nlet ok = 3;");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].span.line, 1);
        assert_eq!(errors[1].span.line, 3);
    }

    #[test]
    fn test_reserved_keyword() {
        let errors = parse_errors("return 1;");
        assert!(errors[0].message.contains("reserved"));
    }

    #[test]
    fn test_let_not_allowed_as_branch_body() {
        let errors = parse_errors("if (true) let x = 1;");
        assert!(errors[0].message.contains("'let'"));
    }

    #[test]
    fn test_ast_json_roundtrip() {
        let prog = parse("let x = 1; print x;");
        let json = serde_json::to_string(&prog).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stmts.len(), 2);
    }
}
