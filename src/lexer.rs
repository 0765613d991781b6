use crate::diag::Diagnostics;
use crate::token::{Span, Token, TokenKind, keyword};

/// Hand-written scanner over the raw source bytes.
///
/// Errors are reported to the diagnostic sink and scanning continues with a
/// sentinel token where one exists, so a single bad literal does not hide
/// later problems.
pub struct Lexer<'a, 'd> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    diags: &'d mut Diagnostics,
}

impl<'a, 'd> Lexer<'a, 'd> {
    pub fn new(input: &'a str, diags: &'d mut Diagnostics) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            diags,
        }
    }

    /// Next token, or `None` at end of input. The `Eof` sentinel is appended
    /// by `tokenize`.
    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.start_span();
            let ch = self.peek_char()?;

            let token = match ch {
                c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
                c if c.is_ascii_digit() => self.read_number(start),
                '.' if self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_number(start)
                }
                '\'' => self.read_char_literal(start),
                _ => match self.read_operator(start) {
                    Some(token) => token,
                    None => {
                        self.diags
                            .error(start, format!("unknown character '{ch}'"));
                        self.consume_char();
                        continue;
                    }
                },
            };
            return Some(token);
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.consume_char();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    self.consume_while(|c| c != '\n');
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    let start = self.start_span();
                    self.consume_char();
                    self.consume_char();
                    // Block comments do not nest.
                    loop {
                        match self.peek_char() {
                            Some('*') if self.peek_char_at(1) == Some('/') => {
                                self.consume_char();
                                self.consume_char();
                                break;
                            }
                            Some(_) => {
                                self.consume_char();
                            }
                            None => {
                                self.diags.error(start, "unterminated block comment");
                                break;
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, start: Span) -> Token<'a> {
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let span = self.finish_span(start);
        let ident = &self.input[span.start..span.end];
        let kind = keyword(ident).unwrap_or(TokenKind::Name(ident));
        Token::new(kind, span)
    }

    fn read_number(&mut self, start: Span) -> Token<'a> {
        self.consume_while(|c| c.is_ascii_digit());
        let is_float = if self.peek_char() == Some('.') {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            true
        } else {
            false
        };
        let span = self.finish_span(start);
        let text = &self.input[span.start..span.end];

        if is_float {
            // Shapes `1.`, `.5` and `1.5` all parse as f64.
            let value = text.parse::<f64>().unwrap_or_default();
            return Token::new(TokenKind::Float(value), span);
        }
        match text.parse::<i32>() {
            Ok(value) => Token::new(TokenKind::Integer(value), span),
            Err(_) => {
                self.diags.error(
                    start,
                    format!("numeric overflow: '{text}' does not fit in a 32-bit integer"),
                );
                Token::new(TokenKind::Integer(0), span)
            }
        }
    }

    fn read_char_literal(&mut self, start: Span) -> Token<'a> {
        self.consume_char(); // opening quote
        let value = match self.peek_char() {
            Some('\\') => {
                self.consume_char();
                self.read_escape(start)
            }
            Some('\'') | Some('\n') | None => None,
            Some(c) => {
                self.consume_char();
                if c.is_ascii() {
                    Some(c as u8)
                } else {
                    self.diags
                        .error(start, "invalid character literal: not a single byte");
                    Some(0)
                }
            }
        };

        let value = match value {
            Some(value) => {
                if self.peek_char() == Some('\'') {
                    self.consume_char();
                } else {
                    self.diags
                        .error(start, "invalid character literal: missing closing quote");
                }
                value
            }
            None => {
                self.diags
                    .error(start, "invalid character literal: missing closing quote");
                // Consume a stray quote so `''` is one error, not two.
                if self.peek_char() == Some('\'') {
                    self.consume_char();
                }
                0
            }
        };
        Token::new(TokenKind::Char(value), self.finish_span(start))
    }

    /// Escape body after the backslash: `\n \t \r \\ \' \" \0 \xHH`.
    fn read_escape(&mut self, start: Span) -> Option<u8> {
        let ch = self.peek_char()?;
        self.consume_char();
        match ch {
            'n' => Some(b'\n'),
            't' => Some(b'\t'),
            'r' => Some(b'\r'),
            '\\' => Some(b'\\'),
            '\'' => Some(b'\''),
            '"' => Some(b'"'),
            '0' => Some(0),
            'x' => {
                let hi = self.consume_hex_digit();
                let lo = self.consume_hex_digit();
                match (hi, lo) {
                    (Some(hi), Some(lo)) => Some(hi * 16 + lo),
                    _ => {
                        self.diags
                            .error(start, "invalid character literal: bad \\x escape");
                        Some(0)
                    }
                }
            }
            _ => {
                self.diags
                    .error(start, format!("invalid character literal: escape '\\{ch}'"));
                Some(0)
            }
        }
    }

    fn consume_hex_digit(&mut self) -> Option<u8> {
        let digit = self.peek_char()?.to_digit(16)?;
        self.consume_char();
        Some(digit as u8)
    }

    /// Multi-character operators are matched greedily before single-character
    /// fallbacks.
    fn read_operator(&mut self, start: Span) -> Option<Token<'a>> {
        let ch = self.peek_char()?;
        let next = self.peek_char_at(1);
        let (kind, len) = match (ch, next) {
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('=', Some('=')) => (TokenKind::EqualEqual, 2),
            ('!', Some('=')) => (TokenKind::NotEqual, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('>', _) => (TokenKind::Greater, 1),
            ('!', _) => (TokenKind::Not, 1),
            ('`', _) => (TokenKind::Backtick, 1),
            ('^', _) => (TokenKind::Caret, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (';', _) => (TokenKind::Semi, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.consume_char();
        }
        Some(Token::new(kind, self.finish_span(start)))
    }

    fn consume_while<P>(&mut self, keep: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn start_span(&self) -> Span {
        Span {
            start: self.pos,
            end: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn finish_span(&self, start: Span) -> Span {
        Span {
            end: self.pos,
            ..start
        }
    }
}

/// Scans the whole source, always ending in an `Eof` sentinel token.
pub fn tokenize<'a>(input: &'a str, diags: &mut Diagnostics) -> Vec<Token<'a>> {
    let mut lexer = Lexer::new(input, diags);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token);
    }
    tokens.push(Token::new(TokenKind::Eof, lexer.start_span()));
    tokens
}
