//! The signature file scanner.
//!
//! Tokenizes a whole file up front. Whitespace and `#` comments are
//! skipped; every token carries its byte span.

use steep_common::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers and keywords; the parser tells them apart by text.
    Ident,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Lt,
    Comma,
    Colon,
    Pipe,
    Amp,
    Arrow,
    Eq,
    Eof,
    /// A byte the scanner does not understand.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole input. The final token is always `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.pos;
        let Some(&byte) = self.bytes.get(self.pos) else {
            return self.token(TokenKind::Eof, start);
        };

        match byte {
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'<' => self.single(TokenKind::Lt),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b'|' => self.single(TokenKind::Pipe),
            b'&' => self.single(TokenKind::Amp),
            b'=' => self.single(TokenKind::Eq),
            b'-' => {
                if self.bytes.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    self.token(TokenKind::Arrow, start)
                } else {
                    self.pos += 1;
                    self.token(TokenKind::Unknown, start)
                }
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                self.pos += 1;
                while self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
                {
                    self.pos += 1;
                }
                // Method names may end with ? or !
                if self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|b| *b == b'?' || *b == b'!')
                {
                    self.pos += 1;
                }
                self.token(TokenKind::Ident, start)
            }
            _ => {
                self.pos += 1;
                self.token(TokenKind::Unknown, start)
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        self.token(kind, start)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            text: self.source.get(start..self.pos).unwrap_or("").to_string(),
            span: Span::new(start as u32, self.pos as u32),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(&byte) = self.bytes.get(self.pos) {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => {
                    while self.bytes.get(self.pos).is_some_and(|b| *b != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }
}
