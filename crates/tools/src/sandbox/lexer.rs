//! Tokenizer for the sandbox language.
//!
//! Newlines and `;` both end a statement. Newlines inside brackets are
//! ignored, the same implicit line joining Python does. `#` starts a
//! comment that runs to the end of the line.

use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    If,
    Else,
    For,
    Import,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    /// Statement separator: newline or `;`.
    Separator,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, SandboxError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\\' if chars.get(i + 1) == Some(&'\n') => i += 2,
            '\n' => {
                if depth == 0 {
                    tokens.push(Token::Separator);
                }
                i += 1;
            }
            ';' => {
                tokens.push(Token::Separator);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                tokens.push(match c {
                    '(' => Token::LParen,
                    '[' => Token::LBracket,
                    _ => Token::LBrace,
                });
                i += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                tokens.push(match c {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                });
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '\'' | '"' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            '.' if !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (tok, next) = lex_number(&chars, i)?;
                tokens.push(tok);
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword(word));
            }
            _ => {
                let (tok, len) = lex_operator(&chars, i)?;
                tokens.push(tok);
                i += len;
            }
        }
    }

    Ok(tokens)
}

fn keyword(word: String) -> Token {
    match word.as_str() {
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::None,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "if" => Token::If,
        "else" => Token::Else,
        "for" => Token::For,
        "import" => Token::Import,
        _ => Token::Ident(word),
    }
}

fn lex_operator(chars: &[char], i: usize) -> Result<(Token, usize), SandboxError> {
    let next = chars.get(i + 1).copied();
    let tok = match (chars[i], next) {
        ('*', Some('*')) => (Token::DoubleStar, 2),
        ('/', Some('/')) => (Token::DoubleSlash, 2),
        ('=', Some('=')) => (Token::Eq, 2),
        ('!', Some('=')) => (Token::NotEq, 2),
        ('<', Some('=')) => (Token::LtEq, 2),
        ('>', Some('=')) => (Token::GtEq, 2),
        ('+', Some('=')) => (Token::PlusAssign, 2),
        ('-', Some('=')) => (Token::MinusAssign, 2),
        ('*', Some('=')) => (Token::StarAssign, 2),
        ('/', Some('=')) => (Token::SlashAssign, 2),
        ('+', _) => (Token::Plus, 1),
        ('-', _) => (Token::Minus, 1),
        ('*', _) => (Token::Star, 1),
        ('/', _) => (Token::Slash, 1),
        ('%', _) => (Token::Percent, 1),
        ('<', _) => (Token::Lt, 1),
        ('>', _) => (Token::Gt, 1),
        ('=', _) => (Token::Assign, 1),
        (c, _) => {
            return Err(SandboxError::Syntax(format!("unexpected character '{c}'")));
        }
    };
    Ok(tok)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), SandboxError> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let tok = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| SandboxError::Syntax(format!("invalid number '{text}'")))?,
        )
    } else {
        Token::Int(
            text.parse()
                .map_err(|_| SandboxError::Runtime(format!("integer literal too large: {text}")))?,
        )
    };
    Ok((tok, i))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), SandboxError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\n' => break,
            '\\' => {
                let escaped = chars.get(i + 1).copied();
                match escaped {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                }
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(SandboxError::Syntax("unterminated string literal".into()))
}
