//! Error types for resolution, argument encoding, framing, transport and session control

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::transport::ConnectionState;

/// Hostname resolution failure (reported as a bad configuration, never retried)
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unable to resolve hostname '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("hostname '{host}' resolved to no addresses")]
    NoAddress { host: String },

    #[error("no host configured")]
    Empty,
}

/// Invalid argument syntax or an argument value that cannot go on the wire
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("unterminated quote starting at token {token}: {text}")]
    UnterminatedQuote { token: usize, text: String },

    #[error("integer literal out of int32 range: {0}")]
    IntegerOutOfRange(String),

    #[error("not an integer: {0}")]
    InvalidInt(String),

    #[error("not a number: {0}")]
    InvalidFloat(String),

    #[error("non-finite float cannot be sent: {0}")]
    NonFiniteFloat(String),

    #[error("invalid {encoding} blob: {reason}")]
    InvalidBlob { encoding: &'static str, reason: String },

    #[error("unknown argument type tag '{0}'")]
    UnknownTypeTag(char),

    #[error("invalid value for '{param}': {value:?}")]
    InvalidParameter { param: String, value: String },
}

/// OSC packet encode/decode and stream framing failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("OSC address must start with '/': {0:?}")]
    InvalidPath(String),

    #[error("failed to encode OSC packet: {0}")]
    Encode(String),

    #[error("malformed OSC packet: {0}")]
    Decode(String),

    #[error("unsupported OSC argument type in {path}: {type_name}")]
    UnsupportedType { path: String, type_name: String },

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("invalid SLIP escape byte 0x{0:02X}")]
    BadEscape(u8),
}

/// Socket level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind local socket {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors surfaced by the session controller
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("bad configuration: {0}")]
    BadConfig(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("send aborted: {0}")]
    Argument(#[from] ArgumentError),

    #[error("no session is open")]
    NoSession,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' requires parameter '{param}'")]
    MissingParameter { action: String, param: String },
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
