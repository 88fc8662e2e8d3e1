//! Multi-argument text syntax
//!
//! Users type OSC arguments as a single line, e.g. `1 "two words" 2.5`.
//! Tokens are whitespace separated; a token opening with `"` runs until a
//! token closing with `"`. Integers (no `.`) become int32, numbers with a `.`
//! become float32, everything else is a string.

use super::OscArg;
use crate::error::ArgumentError;

/// Parse a line of user-typed arguments
///
/// Returns every argument or an error; never a partial list.
pub fn parse_arguments(text: &str) -> Result<Vec<OscArg>, ArgumentError> {
    let mut args = Vec::new();
    let mut tokens = text.split_whitespace().enumerate();

    while let Some((index, token)) = tokens.next() {
        if let Some(rest) = token.strip_prefix('"') {
            // Single-token quoted string
            if let Some(inner) = rest.strip_suffix('"') {
                args.push(OscArg::String(inner.to_string()));
                continue;
            }

            let mut parts = vec![rest];
            let mut closed = false;
            for (_, next) in tokens.by_ref() {
                if let Some(last) = next.strip_suffix('"') {
                    parts.push(last);
                    closed = true;
                    break;
                }
                parts.push(next);
            }

            if !closed {
                return Err(ArgumentError::UnterminatedQuote {
                    token: index,
                    text: parts.join(" "),
                });
            }
            args.push(OscArg::String(parts.join(" ")));
            continue;
        }

        args.push(parse_token(token)?);
    }

    Ok(args)
}

fn parse_token(token: &str) -> Result<OscArg, ArgumentError> {
    if is_integer_literal(token) {
        return token
            .parse::<i32>()
            .map(OscArg::Int)
            .map_err(|_| ArgumentError::IntegerOutOfRange(token.to_string()));
    }

    if token.contains('.') {
        if let Ok(value) = token.parse::<f32>() {
            return OscArg::float(value);
        }
    }

    Ok(OscArg::String(token.trim_matches('"').to_string()))
}

fn is_integer_literal(token: &str) -> bool {
    let digits = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
