use crate::compiler::span::Span;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Number(f64),
    Str(String),

    // ── Identifier ───────────────────────────────────────────
    Ident(String),

    // ── Keywords ─────────────────────────────────────────────
    Let,
    Print,
    Read,
    If,
    Else,
    While,
    And,
    Or,
    True,
    False,
    Null,

    // Reserved, never accepted by the parser
    For,
    Return,
    To,

    // ── Delimiters ───────────────────────────────────────────
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // ── Punctuation ──────────────────────────────────────────
    Comma,     // ,
    Dot,       // .
    Semicolon, // ;

    // ── Operators ────────────────────────────────────────────
    Minus,  // -
    Plus,   // +
    Star,   // *
    Slash,  // /
    Bang,   // !
    NotEq,  // !=
    Eq,     // =
    EqEq,   // ==
    Gt,     // >
    GtEq,   // >=
    Lt,     // <
    LtEq,   // <=

    Eof,
}

impl TokenKind {
    /// Map an identifier string to its keyword token, if any.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "and" => Some(TokenKind::And),
            "else" => Some(TokenKind::Else),
            "false" => Some(TokenKind::False),
            "for" => Some(TokenKind::For),
            "if" => Some(TokenKind::If),
            "let" => Some(TokenKind::Let),
            "null" => Some(TokenKind::Null),
            "or" => Some(TokenKind::Or),
            "print" => Some(TokenKind::Print),
            "read" => Some(TokenKind::Read),
            "return" => Some(TokenKind::Return),
            "to" => Some(TokenKind::To),
            "true" => Some(TokenKind::True),
            "while" => Some(TokenKind::While),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, TokenKind::Eof)
    }

    /// Tokens the parser may resynchronise on after an error.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Let
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Read
                | TokenKind::Return
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::Let => write!(f, "let"),
            TokenKind::Print => write!(f, "print"),
            TokenKind::Read => write!(f, "read"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::While => write!(f, "while"),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::To => write!(f, "to"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Eq => write!(f, "="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Eof => write!(f, "<EOF>"),
        }
    }
}
