//! Lexer for nalgae programs.

use crate::error::CoreError;
use crate::runtime::is_ascii_allowed;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    StringLiteral,

    // Keywords
    Def,

    // Punctuation
    LParen, // (
    RParen, // )
    Equal,  // =
    LBrace, // {
    RBrace, // }
    Pipe,   // |
    Semi,   // ;
}

/// A single token with the line it starts on.
///
/// For string literals `lexeme` holds the literal's content without
/// the surrounding quotes; for `Eof` it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }
}

/// Lex a source string into tokens, terminated by an `Eof` token.
///
/// Lexing stops at the first error.
pub fn lex(source: &str) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        index: 0,
        line: 1,
    };
    let tokens = lexer.run()?;
    tracing::debug!(count = tokens.len(), "lexed source");
    Ok(tokens)
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
    line: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                if ch == b'\n' {
                    self.line += 1;
                }
                continue;
            }

            let line = self.line;
            let token = match ch {
                b'(' => self.punct(TokenKind::LParen, "(", line),
                b')' => self.punct(TokenKind::RParen, ")", line),
                b'=' => self.punct(TokenKind::Equal, "=", line),
                b'{' => self.punct(TokenKind::LBrace, "{", line),
                b'}' => self.punct(TokenKind::RBrace, "}", line),
                b'|' => self.punct(TokenKind::Pipe, "|", line),
                b';' => self.punct(TokenKind::Semi, ";", line),
                b'#' => {
                    self.skip_comment();
                    continue;
                }
                b'"' if self.peek_next() == Some(b'"') && self.peek_at(2) == Some(b'"') => {
                    self.index += 3;
                    self.lex_multiline_string(line)?
                }
                b'"' | b'\'' => {
                    self.consume_char();
                    self.lex_string(ch, line)?
                }
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(line),
                _ => return Err(self.unexpected_char()),
            };
            tokens.push(token);
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line));
        Ok(tokens)
    }

    fn punct(&mut self, kind: TokenKind, text: &str, line: usize) -> Token {
        self.consume_char();
        Token::new(kind, text, line)
    }

    fn unexpected_char(&self) -> CoreError {
        let ch = self.current_char().unwrap_or('\0');
        CoreError::lex(self.line, format!("Unexpected character '{ch}'"))
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    /// Single-line literal; the opening quote has already been consumed.
    fn lex_string(&mut self, quote: u8, line: usize) -> Result<Token, CoreError> {
        let mut content = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == quote {
                self.consume_char();
                return Ok(Token::new(TokenKind::StringLiteral, content, line));
            }
            if ch == b'\n' {
                return Err(CoreError::lex(self.line, "Unterminated string literal"));
            }
            content.push(self.take_literal_char()?);
        }
        Err(CoreError::lex(self.line, "Unterminated string literal"))
    }

    /// Triple-quoted literal; the opening `"""` has already been consumed.
    fn lex_multiline_string(&mut self, line: usize) -> Result<Token, CoreError> {
        let mut content = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == b'"' && self.peek_next() == Some(b'"') && self.peek_at(2) == Some(b'"') {
                self.index += 3;
                return Ok(Token::new(TokenKind::StringLiteral, content, line));
            }
            let taken = self.take_literal_char()?;
            if taken == '\n' {
                self.line += 1;
            }
            content.push(taken);
        }
        Err(CoreError::lex(
            self.line,
            "Unterminated multi-line string literal",
        ))
    }

    /// Consume one character of literal content, enforcing the ASCII policy.
    fn take_literal_char(&mut self) -> Result<char, CoreError> {
        let ch = self.current_char().unwrap_or('\0');
        if !is_ascii_allowed(ch) {
            return Err(CoreError::lex(
                self.line,
                "Non-ASCII character in string literal",
            ));
        }
        self.consume_char();
        Ok(ch)
    }

    fn lex_ident_or_keyword(&mut self, line: usize) -> Token {
        let start = self.index;
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.index];
        let kind = match text {
            "def" => TokenKind::Def,
            _ => TokenKind::Ident,
        };
        Token::new(kind, text, line)
    }

    fn current_char(&self) -> Option<char> {
        self.source.get(self.index..)?.chars().next()
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.chars.get(self.index + offset).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
