//! Comparison operators for feedback conditions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::osc::OscArg;

/// Comparison applied between a received value and a target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanEqual,
    LessThanEqual,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "notequal",
            Self::GreaterThan => "greaterthan",
            Self::LessThan => "lessthan",
            Self::GreaterThanEqual => "greaterthanequal",
            Self::LessThanEqual => "lessthanequal",
        }
    }

    /// Ordering operators are only defined on numbers
    pub fn is_ordering(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" | "=" | "==" => Ok(Self::Equal),
            "notequal" | "!=" => Ok(Self::NotEqual),
            "greaterthan" | ">" => Ok(Self::GreaterThan),
            "lessthan" | "<" => Ok(Self::LessThan),
            "greaterthanequal" | ">=" => Ok(Self::GreaterThanEqual),
            "lessthanequal" | "<=" => Ok(Self::LessThanEqual),
            other => Err(format!("unknown comparison '{}'", other)),
        }
    }
}

/// Evaluate `received <op> target`
///
/// Numbers (int32/float32) compare by exact value, no tolerance. Strings,
/// booleans and blobs support equal/not-equal only; any ordering operator on
/// them, or on mixed kinds, is false. Not-equal is always the negation of equal.
pub fn evaluate(received: &OscArg, target: &OscArg, op: Comparison) -> bool {
    if let (Some(a), Some(b)) = (received.as_number(), target.as_number()) {
        return match op {
            Comparison::Equal => a == b,
            Comparison::NotEqual => a != b,
            Comparison::GreaterThan => a > b,
            Comparison::LessThan => a < b,
            Comparison::GreaterThanEqual => a >= b,
            Comparison::LessThanEqual => a <= b,
        };
    }

    let equal = match (received, target) {
        (OscArg::String(a), OscArg::String(b)) => a == b,
        (OscArg::Bool(a), OscArg::Bool(b)) => a == b,
        (OscArg::Blob(a), OscArg::Blob(b)) => a == b,
        _ => false,
    };

    match op {
        Comparison::Equal => equal,
        Comparison::NotEqual => !equal,
        _ => false,
    }
}

/// Result of a positional comparison over an argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceOutcome {
    pub result: bool,
    /// Number of positions evaluated before stopping
    pub compared: usize,
}

/// Compare `targets` against `received` position by position
///
/// Starts from `true` for equal (and the ordering operators) and `false` for
/// not-equal. Equal/ordering stop at the first position that evaluates false;
/// not-equal stops at the first position that evaluates true. A position
/// missing from `received` never equals its target.
pub fn evaluate_sequence(received: &[OscArg], targets: &[OscArg], op: Comparison) -> SequenceOutcome {
    let mut result = op != Comparison::NotEqual;
    let mut compared = 0;

    for (index, target) in targets.iter().enumerate() {
        compared += 1;
        result = match received.get(index) {
            Some(value) => evaluate(value, target, op),
            None => op == Comparison::NotEqual,
        };

        let stop = match op {
            Comparison::NotEqual => result,
            _ => !result,
        };
        if stop {
            break;
        }
    }

    SequenceOutcome { result, compared }
}
