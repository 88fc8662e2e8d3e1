//! Typed OSC arguments and value encoding
//!
//! `OscArg` is the closed set of argument kinds this gateway sends and caches:
//! int32, float32, string, boolean (`T`/`F`, non-standard) and blob.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rosc::OscType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ArgumentError, CodecError};

/// A single typed OSC argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
    Bool(bool),
    Blob(Vec<u8>),
}

/// Wire type tag requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    #[serde(rename = "i")]
    Int,
    #[serde(rename = "f")]
    Float,
    #[serde(rename = "s")]
    String,
    #[serde(rename = "T")]
    True,
    #[serde(rename = "F")]
    False,
    #[serde(rename = "b")]
    Blob,
}

impl ArgType {
    /// Parse an OSC type tag character
    pub fn from_tag(tag: char) -> Result<Self, ArgumentError> {
        match tag {
            'i' => Ok(Self::Int),
            'f' => Ok(Self::Float),
            's' => Ok(Self::String),
            'T' => Ok(Self::True),
            'F' => Ok(Self::False),
            'b' => Ok(Self::Blob),
            other => Err(ArgumentError::UnknownTypeTag(other)),
        }
    }

    pub fn tag(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Float => 'f',
            Self::String => 's',
            Self::True => 'T',
            Self::False => 'F',
            Self::Blob => 'b',
        }
    }
}

/// How blob text is decoded into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobEncoding {
    #[default]
    Base64,
    Hex,
}

impl OscArg {
    /// Float argument, rejecting NaN and infinities
    pub fn float(value: f32) -> Result<Self, ArgumentError> {
        if value.is_finite() {
            Ok(Self::Float(value))
        } else {
            Err(ArgumentError::NonFiniteFloat(value.to_string()))
        }
    }

    /// Encode caller-supplied text as an argument of the requested wire type
    ///
    /// `T` and `F` carry their value in the tag itself; `value` is ignored.
    pub fn encode(value: &str, ty: ArgType, blob: BlobEncoding) -> Result<Self, ArgumentError> {
        match ty {
            ArgType::Int => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i32>()
                    .map(Self::Int)
                    .map_err(|_| ArgumentError::InvalidInt(trimmed.to_string()))
            },
            ArgType::Float => {
                let trimmed = value.trim();
                let parsed = trimmed
                    .parse::<f32>()
                    .map_err(|_| ArgumentError::InvalidFloat(trimmed.to_string()))?;
                Self::float(parsed)
            },
            ArgType::String => Ok(Self::String(value.to_string())),
            ArgType::True => Ok(Self::Bool(true)),
            ArgType::False => Ok(Self::Bool(false)),
            ArgType::Blob => decode_blob(value, blob).map(Self::Blob),
        }
    }

    /// Numeric view used by comparisons (int32 and float32 are exact in f64)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Wire type tag of this argument
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Int(_) => ArgType::Int,
            Self::Float(_) => ArgType::Float,
            Self::String(_) => ArgType::String,
            Self::Bool(true) => ArgType::True,
            Self::Bool(false) => ArgType::False,
            Self::Blob(_) => ArgType::Blob,
        }
    }

    /// Plain text form used for channel variables
    pub fn to_text(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Blob(bytes) => BASE64.encode(bytes),
        }
    }

    pub fn to_osc(&self) -> OscType {
        match self {
            Self::Int(i) => OscType::Int(*i),
            Self::Float(f) => OscType::Float(*f),
            Self::String(s) => OscType::String(s.clone()),
            Self::Bool(b) => OscType::Bool(*b),
            Self::Blob(bytes) => OscType::Blob(bytes.clone()),
        }
    }

    /// Convert a decoded wire argument
    ///
    /// int64 narrows to int32 when it fits (float32 otherwise), double narrows
    /// to float32 and char widens to string. Other types are unsupported.
    pub fn from_osc(path: &str, value: OscType) -> Result<Self, CodecError> {
        match value {
            OscType::Int(i) => Ok(Self::Int(i)),
            OscType::Float(f) => Ok(Self::Float(f)),
            OscType::String(s) => Ok(Self::String(s)),
            OscType::Bool(b) => Ok(Self::Bool(b)),
            OscType::Blob(bytes) => Ok(Self::Blob(bytes)),
            OscType::Long(l) => Ok(i32::try_from(l)
                .map(Self::Int)
                .unwrap_or(Self::Float(l as f32))),
            OscType::Double(d) => Ok(Self::Float(d as f32)),
            OscType::Char(c) => Ok(Self::String(c.to_string())),
            other => Err(CodecError::UnsupportedType {
                path: path.to_string(),
                type_name: format!("{:?}", other),
            }),
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Bool(true) => f.write_str("T"),
            Self::Bool(false) => f.write_str("F"),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

fn decode_blob(value: &str, encoding: BlobEncoding) -> Result<Vec<u8>, ArgumentError> {
    let value = value.trim();
    match encoding {
        BlobEncoding::Base64 => BASE64.decode(value).map_err(|e| ArgumentError::InvalidBlob {
            encoding: "base64",
            reason: e.to_string(),
        }),
        BlobEncoding::Hex => hex::decode(value).map_err(|e| ArgumentError::InvalidBlob {
            encoding: "hex",
            reason: e.to_string(),
        }),
    }
}
