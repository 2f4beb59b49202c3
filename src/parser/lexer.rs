//! Tokenizer for the location-block dialect.
//!
//! Knows just enough of the nginx surface syntax to find statement and
//! block boundaries: words, quoted strings, `{`, `}`, `;` and `#` comments.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word or quoted string (quotes kept verbatim).
    Word(String),
    Open,
    Close,
    Semicolon,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line of the first character.
    pub line: usize,
}

impl Token {
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(w) => Some(w),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated quoted string starting at line {line}")]
    UnterminatedQuote { line: usize },
}

/// Split text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            b'{' | b'}' | b';' => {
                let kind = match c {
                    b'{' => TokenKind::Open,
                    b'}' => TokenKind::Close,
                    _ => TokenKind::Semicolon,
                };
                tokens.push(Token { kind, start: i, end: i + 1, line });
                i += 1;
            }
            b'#' => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                tokens.push(Token { kind: TokenKind::Comment, start, end: i, line });
            }
            b'"' | b'\'' => {
                let (start, start_line) = (i, line);
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(LexError::UnterminatedQuote { line: start_line }),
                        Some(b'\\') => i += 2,
                        Some(&q) if q == c => {
                            i += 1;
                            break;
                        }
                        Some(b'\n') => {
                            line += 1;
                            i += 1;
                        }
                        Some(_) => i += 1,
                    }
                }
                let end = i.min(bytes.len());
                tokens.push(Token {
                    kind: TokenKind::Word(text[start..end].to_string()),
                    start,
                    end,
                    line: start_line,
                });
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'{' | b'}' | b';')
                {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word(text[start..i].to_string()),
                    start,
                    end: i,
                    line,
                });
            }
        }
    }

    Ok(tokens)
}
