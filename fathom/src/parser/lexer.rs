//! Tokenizer for the `CREATE TABLE` subset.

use super::ParseError;

/// Token categories produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: keyword, identifier or type name.
    Word(String),
    /// Identifier in double quotes, backticks or brackets, quotes stripped.
    Quoted(String),
    /// Unsigned numeric literal, kept verbatim.
    Number(String),
    /// Single-quoted string literal, quotes stripped.
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Minus,
    Plus,
    /// Any other punctuation, e.g. operators inside CHECK expressions.
    Symbol(char),
    Eof,
}

/// A token with the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    /// Reads up to `close`; a doubled closing character is an escaped one.
    fn scan_delimited(&mut self, start: usize, close: char) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(c) if c == close => {
                    if self.peek() == Some(close) {
                        self.advance();
                        text.push(close);
                    } else {
                        return Ok(text);
                    }
                }
                Some(c) => text.push(c),
                None => {
                    return Err(ParseError::new(
                        format!("unterminated literal, expected closing {close}"),
                        start,
                    ))
                }
            }
        }
    }

    fn scan_word(&mut self, start: usize) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        if text.chars().all(|c| c.is_ascii_digit()) {
            // a decimal fraction directly after the integer part
            if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
            TokenKind::Number(self.input[start..self.pos].to_string())
        } else {
            TokenKind::Word(text.to_string())
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let Some(c) = self.advance() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            });
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '-' => TokenKind::Minus,
            '+' => TokenKind::Plus,
            '"' => TokenKind::Quoted(self.scan_delimited(start, '"')?),
            '`' => TokenKind::Quoted(self.scan_delimited(start, '`')?),
            '[' => TokenKind::Quoted(self.scan_delimited(start, ']')?),
            '\'' => TokenKind::Str(self.scan_delimited(start, '\'')?),
            c if c.is_alphanumeric() || c == '_' => self.scan_word(start),
            other => TokenKind::Symbol(other),
        };

        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }
}

/// Split `input` into tokens; the last token is always [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
