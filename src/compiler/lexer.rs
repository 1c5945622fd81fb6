use crate::compiler::span::Span;
use crate::compiler::token::{Token, TokenKind};
use std::fmt;

// ═══════════════════════════════════════════════════════════════
//  Error type
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at {}: {}", self.span, self.message)
    }
}

impl std::error::Error for LexError {}

// ═══════════════════════════════════════════════════════════════
//  Lexer
// ═══════════════════════════════════════════════════════════════

pub struct Lexer {
    source: Vec<char>,
    // Byte offset of each char, plus the total length at the end.
    offsets: Vec<usize>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let offsets = source
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(source.len()))
            .collect();
        Self {
            source: source.chars().collect(),
            offsets,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire source. The last token is always `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tracing::trace!(count = tokens.len(), "tokenized source");
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return Ok(Token::new(
                TokenKind::Eof,
                self.span_from(self.pos, self.line, self.col),
            ));
        }

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col;
        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '-' => TokenKind::Minus,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            // `//` comments were already consumed
            '/' => TokenKind::Slash,

            '!' => self.pick('=', TokenKind::NotEq, TokenKind::Bang),
            '=' => self.pick('=', TokenKind::EqEq, TokenKind::Eq),
            '<' => self.pick('=', TokenKind::LtEq, TokenKind::Lt),
            '>' => self.pick('=', TokenKind::GtEq, TokenKind::Gt),

            '"' => return self.lex_string(start, start_line, start_col),

            c if c.is_ascii_digit() => {
                return self.lex_number(start, start_line, start_col);
            }

            c if c.is_ascii_alphabetic() || c == '_' => {
                return Ok(self.lex_ident_or_keyword(start, start_line, start_col));
            }

            other => {
                return Err(LexError {
                    message: format!("unexpected character '{}'", other),
                    span: self.span_from(start, start_line, start_col),
                });
            }
        };

        Ok(Token::new(
            kind,
            self.span_from(start, start_line, start_col),
        ))
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Span from the char at `start` up to the current position, in bytes.
    fn span_from(&self, start: usize, line: u32, col: u32) -> Span {
        Span::new(self.offsets[start], self.offsets[self.pos], line, col)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    /// Two-character operator lookahead: consume `next` if it follows.
    fn pick(&mut self, next: char, matched: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            matched
        } else {
            single
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().map_or(false, |c| c.is_whitespace()) {
                self.advance();
            }

            if self.peek() == Some('/') && self.peek_next() == Some('/') {
                while !self.is_at_end() && self.peek() != Some('\n') {
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    fn lex_string(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<Token, LexError> {
        let mut value = String::new();

        loop {
            if self.is_at_end() {
                return Err(LexError {
                    message: "unterminated string literal".to_string(),
                    span: self.span_from(start, start_line, start_col),
                });
            }

            let c = self.advance();
            match c {
                '"' => break,
                '\\' => {
                    if self.is_at_end() {
                        return Err(LexError {
                            message: "unterminated escape sequence".to_string(),
                            span: self.span_from(start, start_line, start_col),
                        });
                    }
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        '0' => value.push('\0'),
                        other => {
                            return Err(LexError {
                                message: format!("unknown escape sequence '\\{}'", other),
                                span: self.span_from(start, start_line, start_col),
                            });
                        }
                    }
                }
                // strings may span lines
                _ => value.push(c),
            }
        }

        Ok(Token::new(
            TokenKind::Str(value),
            self.span_from(start, start_line, start_col),
        ))
    }

    fn lex_number(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<Token, LexError> {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text: String = self.source[start..self.pos].iter().collect();
        let value: f64 = text.parse().map_err(|_| LexError {
            message: format!("invalid number literal '{}'", text),
            span: self.span_from(start, start_line, start_col),
        })?;
        // Numbers are JVM floats at run time.
        if !value.is_finite() || value > f32::MAX as f64 {
            return Err(LexError {
                message: format!("number literal '{}' is out of range", text),
                span: self.span_from(start, start_line, start_col),
            });
        }

        Ok(Token::new(
            TokenKind::Number(value),
            self.span_from(start, start_line, start_col),
        ))
    }

    fn lex_ident_or_keyword(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }

        let text: String = self.source[start..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));

        Token::new(kind, self.span_from(start, start_line, start_col))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Unit tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_let_statement() {
        let tokens = lex("let x = 10 + 2.5;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::Number(10.0),
                TokenKind::Plus,
                TokenKind::Number(2.5),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let tokens = lex("a == b != c <= d >= e < f > g");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::EqEq,
                TokenKind::Ident("b".into()),
                TokenKind::NotEq,
                TokenKind::Ident("c".into()),
                TokenKind::LtEq,
                TokenKind::Ident("d".into()),
                TokenKind::GtEq,
                TokenKind::Ident("e".into()),
                TokenKind::Lt,
                TokenKind::Ident("f".into()),
                TokenKind::Gt,
                TokenKind::Ident("g".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_bang_and_keywords() {
        let tokens = lex("!done and flag or null");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Bang,
                TokenKind::Ident("done".into()),
                TokenKind::And,
                TokenKind::Ident("flag".into()),
                TokenKind::Or,
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal_with_escape() {
        let tokens = lex(r#""hello\n\"world\"""#);
        assert_eq!(
            tokens,
            vec![TokenKind::Str("hello\n\"world\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_multiline_string_tracks_lines() {
        let mut lexer = Lexer::new("\"a\nb\" x");
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".into()));
        assert_eq!(tokens[1].span.line, 2);
    }

    #[test]
    fn test_trailing_dot_is_not_fraction() {
        let tokens = lex("3.");
        assert_eq!(
            tokens,
            vec![TokenKind::Number(3.0), TokenKind::Dot, TokenKind::Eof]
        );
    }

    #[test]
    fn test_number_out_of_float_range() {
        let err = Lexer::new("let x = 1000000000000000000000000000000000000000;")
            .tokenize()
            .unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("// leading comment\nprint x; // trailing");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Print,
                TokenKind::Ident("x".into()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let mut lexer = Lexer::new("let a = 1;\n\nread a;");
        let tokens = lexer.tokenize().unwrap();
        let read = tokens.iter().find(|t| t.kind == TokenKind::Read).unwrap();
        assert_eq!(read.span.line, 3);
        assert_eq!(read.span.col, 1);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("print \"oops").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.span.line, 1);
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("let x = 1 % 2;").tokenize().unwrap_err();
        assert!(err.message.contains("'%'"));
        assert_eq!(err.span.col, 11);
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = Lexer::new("print \"é\"; x").tokenize().unwrap();
        // `é` is two bytes, so the string token covers 4 bytes in 3 chars.
        assert_eq!((tokens[1].span.start, tokens[1].span.end), (6, 10));
        assert_eq!((tokens[2].span.start, tokens[2].span.end), (10, 11));
        assert_eq!(tokens[3].span.start, 12);
        assert_eq!(tokens[3].span.col, 12);
        assert_eq!(tokens[4].span.start, 13);
    }
}
