use crate::script::error::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    Let,

    LParen,
    RParen,
    Comma,
    Colon,
    Eq,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    /// Statement separator: a newline outside parentheses or `;`.
    Newline,
    Semi,

    Eof,
}

/// Tokenize step code.
///
/// `//` comments run to the end of the line. Newlines nested inside parentheses are dropped so
/// long calls can wrap.
pub(crate) fn lex(input: &str) -> Result<Vec<Token>, ScriptError> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let mut depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;

        if c == '\n' {
            i += 1;
            if depth == 0 {
                out.push(Token {
                    kind: TokenKind::Newline,
                    span: Span { start, end: i },
                });
            }
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // Number: [0-9]+(.[0-9]+)?([eE][+-]?[0-9]+)? or .[0-9]+([eE][+-]?[0-9]+)?
        if c.is_ascii_digit()
            || (c == '.' && i + 1 < bytes.len() && (bytes[i + 1] as char).is_ascii_digit())
        {
            if c == '.' {
                i += 1;
            } else {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len()
                    && (bytes[i] as char) == '.'
                    && i + 1 < bytes.len()
                    && (bytes[i + 1] as char).is_ascii_digit()
                {
                    i += 1;
                }
            }

            while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                i += 1;
            }

            if i < bytes.len() && matches!(bytes[i] as char, 'e' | 'E') {
                let e_pos = i;
                i += 1;
                if i < bytes.len() && matches!(bytes[i] as char, '+' | '-') {
                    i += 1;
                }
                let exp_start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                if exp_start == i {
                    return Err(ScriptError::new(
                        e_pos,
                        "invalid number exponent (expected digits)",
                    ));
                }
            }

            let v: f64 = input[start..i]
                .parse()
                .map_err(|_| ScriptError::new(start, "invalid number"))?;
            out.push(Token {
                kind: TokenKind::Number(v),
                span: Span { start, end: i },
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let s = &input[start..i];
            let kind = match s {
                "let" => TokenKind::Let,
                _ => TokenKind::Ident(s.to_owned()),
            };
            out.push(Token {
                kind,
                span: Span { start, end: i },
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let (value, end) = lex_string(input, start, c)?;
            i = end;
            out.push(Token {
                kind: TokenKind::Str(value),
                span: Span { start, end },
            });
            continue;
        }

        let kind = match c {
            '(' => {
                depth += 1;
                TokenKind::LParen
            }
            ')' => {
                depth = depth.saturating_sub(1);
                TokenKind::RParen
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Eq,
            ';' => TokenKind::Semi,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            _ => {
                let ch = input[start..].chars().next().unwrap_or(c);
                return Err(ScriptError::new(
                    start,
                    format!("unexpected character '{ch}'"),
                ));
            }
        };
        i += 1;
        out.push(Token {
            kind,
            span: Span { start, end: i },
        });
    }

    out.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: input.len(),
            end: input.len(),
        },
    });

    Ok(out)
}

/// Lex a quoted string starting at `start`; returns the unescaped value and the end offset.
fn lex_string(input: &str, start: usize, quote: char) -> Result<(String, usize), ScriptError> {
    let mut value = String::new();
    let mut chars = input[start + 1..].char_indices();
    while let Some((rel, ch)) = chars.next() {
        let at = start + 1 + rel;
        match ch {
            c if c == quote => return Ok((value, at + c.len_utf8())),
            '\n' => return Err(ScriptError::new(start, "unterminated string literal")),
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    break;
                };
                value.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    '"' => '"',
                    '\'' => '\'',
                    '\\' => '\\',
                    other => {
                        return Err(ScriptError::new(
                            at,
                            format!("unknown escape sequence '\\{other}'"),
                        ));
                    }
                });
            }
            c => value.push(c),
        }
    }
    Err(ScriptError::new(start, "unterminated string literal"))
}
