//! Structured view of a location body.
//!
//! Only the directives the hardener reasons about get their own variant;
//! everything else is carried verbatim as `Opaque`, so no full nginx
//! grammar is needed.

use thiserror::Error;

use crate::parser::lexer::{tokenize, LexError, Token, TokenKind};

/// One statement (or nested non-location block) inside a location body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `proxy_pass <target>;`
    ProxyPass { target: String },
    /// `set $<name> <value>;`
    SetVar { name: String, value: String },
    /// `resolver <args>;`
    Resolver { args: String },
    /// `error_page <args>;`
    ErrorPage { args: String },
    /// `proxy_intercept_errors on|off;`
    InterceptErrors { enabled: bool },
    /// Anything else, exactly as authored.
    Opaque(String),
}

impl Directive {
    pub fn render(&self) -> String {
        match self {
            Directive::ProxyPass { target } => format!("proxy_pass {};", target),
            Directive::SetVar { name, value } => format!("set ${} {};", name, value),
            Directive::Resolver { args } => format!("resolver {};", args),
            Directive::ErrorPage { args } => format!("error_page {};", args),
            Directive::InterceptErrors { enabled } => {
                format!("proxy_intercept_errors {};", if *enabled { "on" } else { "off" })
            }
            Directive::Opaque(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("nested location at line {line} is not supported")]
    NestedLocation { line: usize },
    #[error("unterminated block at line {line}")]
    Unterminated { line: usize },
    #[error("unexpected '}}' at line {line}")]
    UnexpectedClose { line: usize },
}

/// Parsed body of one location block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationBody {
    pub directives: Vec<Directive>,
}

impl LocationBody {
    /// Parse the text between a location's braces.
    ///
    /// `first_line` is the line the body starts on within its fragment,
    /// so reported line numbers point into the original file.
    pub fn parse(text: &str, first_line: usize) -> Result<Self, BodyError> {
        let tokens = tokenize(text).map_err(|e| match e {
            LexError::UnterminatedQuote { line } => LexError::UnterminatedQuote {
                line: line + first_line - 1,
            },
        })?;
        let line_of = |t: &Token| t.line + first_line - 1;

        let mut directives = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let start = &tokens[i];
            match start.kind {
                TokenKind::Comment => {
                    directives.push(Directive::Opaque(text[start.start..start.end].to_string()));
                    i += 1;
                    continue;
                }
                TokenKind::Semicolon => {
                    i += 1;
                    continue;
                }
                TokenKind::Close => return Err(BodyError::UnexpectedClose { line: line_of(start) }),
                TokenKind::Open | TokenKind::Word(_) => {}
            }

            if start.word() == Some("location") {
                return Err(BodyError::NestedLocation { line: line_of(start) });
            }

            // Collect words up to the statement terminator or block opener.
            let mut words = Vec::new();
            let mut j = i;
            while j < tokens.len() {
                match &tokens[j].kind {
                    TokenKind::Word(w) => words.push(w.as_str()),
                    TokenKind::Comment => {}
                    _ => break,
                }
                j += 1;
            }

            match tokens.get(j).map(|t| &t.kind) {
                Some(TokenKind::Semicolon) => {
                    let raw = &text[start.start..tokens[j].end];
                    directives.push(classify(&words, raw));
                    i = j + 1;
                }
                Some(TokenKind::Open) => {
                    let close = matching_close(&tokens, j, &line_of)?;
                    directives.push(Directive::Opaque(
                        text[start.start..tokens[close].end].to_string(),
                    ));
                    i = close + 1;
                }
                Some(TokenKind::Close) => {
                    return Err(BodyError::UnexpectedClose { line: line_of(&tokens[j]) })
                }
                _ => return Err(BodyError::Unterminated { line: line_of(start) }),
            }
        }

        Ok(Self { directives })
    }

    /// Render with each statement on its own line at the given indent.
    pub fn render(&self, indent: &str) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            for line in directive.render().lines() {
                out.push_str(indent);
                out.push_str(line.trim_end());
                out.push('\n');
            }
        }
        out
    }

    pub fn proxy_pass(&self) -> Option<&str> {
        self.directives.iter().find_map(|d| match d {
            Directive::ProxyPass { target } => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn has_resolver(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, Directive::Resolver { .. }))
    }

    /// True when the body already decides how backend errors are handled.
    pub fn has_error_handling(&self) -> bool {
        self.directives.iter().any(|d| {
            matches!(
                d,
                Directive::ErrorPage { .. } | Directive::InterceptErrors { .. }
            )
        })
    }

    /// Value assigned to `$name`, if the body sets it.
    pub fn assignment(&self, name: &str) -> Option<&str> {
        self.directives.iter().find_map(|d| match d {
            Directive::SetVar { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }
}

fn classify(words: &[&str], raw: &str) -> Directive {
    match words {
        ["proxy_pass", target] => Directive::ProxyPass {
            target: (*target).to_string(),
        },
        ["set", var, value] if var.starts_with('$') && var.len() > 1 => Directive::SetVar {
            name: var[1..].to_string(),
            value: (*value).to_string(),
        },
        ["resolver", args @ ..] if !args.is_empty() => Directive::Resolver {
            args: args.join(" "),
        },
        ["error_page", args @ ..] if !args.is_empty() => Directive::ErrorPage {
            args: args.join(" "),
        },
        ["proxy_intercept_errors", flag] if *flag == "on" || *flag == "off" => {
            Directive::InterceptErrors {
                enabled: *flag == "on",
            }
        }
        _ => Directive::Opaque(raw.to_string()),
    }
}

fn matching_close(
    tokens: &[Token],
    open: usize,
    line_of: &impl Fn(&Token) -> usize,
) -> Result<usize, BodyError> {
    let mut depth = 0usize;
    // Only a word in directive-name position can open a nested location.
    let mut statement_start = true;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Open => {
                depth += 1;
                statement_start = true;
            }
            TokenKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
                statement_start = true;
            }
            TokenKind::Semicolon => statement_start = true,
            TokenKind::Word(ref w) => {
                if statement_start && w == "location" {
                    return Err(BodyError::NestedLocation { line: line_of(token) });
                }
                statement_start = false;
            }
            TokenKind::Comment => {}
        }
    }
    Err(BodyError::Unterminated {
        line: line_of(&tokens[open]),
    })
}
