//! Placeholder grammar used inside dashboard templates.
//!
//! Recognized tokens are `{campus}`, `{building}`, `{device}` and
//! `{point:<key>}`. Grafana variables (`${var}`, `$var`) and legend formats
//! (`{{label}}`) are copied through untouched, as is any other brace text.

use crate::domain::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    Campus,
    Building,
    Device,
    Point(&'a str),
}

const POINT_PREFIX: &str = "point:";

/// Split a template string into literal runs and placeholder tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        // `${var}` belongs to Grafana
        if i > 0 && bytes[i - 1] == b'$' {
            i += 1;
            continue;
        }
        // `{{label}}` is a legend format, skip both braces
        if bytes.get(i + 1) == Some(&b'{') {
            i += 2;
            continue;
        }

        let rest = &input[i + 1..];
        let Some(close) = rest.find('}') else {
            if rest.starts_with(POINT_PREFIX) {
                return Err(TemplateError::Unterminated {
                    context: input.to_string(),
                });
            }
            break;
        };

        let body = &rest[..close];
        let token = match body {
            "campus" => Some(Token::Campus),
            "building" => Some(Token::Building),
            "device" => Some(Token::Device),
            _ => match body.strip_prefix(POINT_PREFIX) {
                Some(key) if is_valid_key(key) => Some(Token::Point(key)),
                Some(_) => {
                    return Err(TemplateError::MalformedPoint {
                        token: format!("{{{}}}", body),
                    });
                }
                None => None,
            },
        };

        match token {
            Some(token) => {
                if literal_start < i {
                    tokens.push(Token::Literal(&input[literal_start..i]));
                }
                tokens.push(token);
                i += close + 2;
                literal_start = i;
            }
            None => i += 1,
        }
    }

    if literal_start < input.len() {
        tokens.push(Token::Literal(&input[literal_start..]));
    }

    Ok(tokens)
}

/// Canonical keys referenced through `{point:<key>}` in a single string.
pub fn point_keys(input: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(tokenize(input)?
        .into_iter()
        .filter_map(|t| match t {
            Token::Point(key) => Some(key),
            _ => None,
        })
        .collect())
}

/// True if the string still holds a recognized placeholder.
pub fn has_placeholder(input: &str) -> bool {
    match tokenize(input) {
        Ok(tokens) => tokens.iter().any(|t| !matches!(t, Token::Literal(_))),
        Err(_) => true,
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
