use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Int(i128),
    Float(f64),
    Str(String),
    Char(char),
    Ident(String),
    True,
    False,
    Null,
    Hash,
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    Eof,
}

pub(super) fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0usize;
    let mut tokens = Vec::new();
    let fail = |reason: &str| ExprError::Parse {
        expr: src.to_string(),
        reason: reason.to_string(),
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => {
                tokens.push(Token::Hash);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(fail("bare '=' is not a valid operator, did you mean '=='?"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(fail("bare '&' is not a valid operator"));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(fail("bare '|' is not a valid operator"));
                }
            }
            '\'' => {
                let (ch, consumed) = read_char_literal(&chars[i + 1..]).map_err(|e| fail(&e))?;
                tokens.push(Token::Char(ch));
                i += consumed + 2;
            }
            '"' => {
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != '"' {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(fail("unterminated string literal"));
                }
                tokens.push(Token::Str(s));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                if c == '0' && chars.get(i + 1) == Some(&'x') {
                    i += 2;
                    let hex_start = i;
                    while i < chars.len() && chars[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    let text: String = chars[hex_start..i].iter().collect();
                    let v = i128::from_str_radix(&text, 16)
                        .map_err(|_| fail("invalid hexadecimal literal"))?;
                    tokens.push(Token::Int(v));
                } else {
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                        i += 1;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let text: String = chars[start..i].iter().collect();
                        let v: f64 = text.parse().map_err(|_| fail("invalid float literal"))?;
                        tokens.push(Token::Float(v));
                    } else {
                        let text: String = chars[start..i].iter().collect();
                        let v: i128 = text.parse().map_err(|_| fail("invalid integer literal"))?;
                        tokens.push(Token::Int(v));
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(text),
                });
            }
            other => return Err(fail(&format!("unexpected character '{other}'"))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn read_char_literal(rest: &[char]) -> Result<(char, usize), String> {
    if rest.is_empty() {
        return Err("unterminated character literal".to_string());
    }
    if rest[0] == '\\' {
        if rest.len() < 2 || rest.get(2) != Some(&'\'') {
            return Err("invalid character escape".to_string());
        }
        let ch = match rest[1] {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '\'' => '\'',
            other => return Err(format!("unknown escape '\\{other}'")),
        };
        Ok((ch, 3))
    } else if rest.get(1) == Some(&'\'') {
        Ok((rest[0], 2))
    } else {
        Err("character literal must contain exactly one character".to_string())
    }
}
