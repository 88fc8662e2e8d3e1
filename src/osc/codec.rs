//! OSC packet encoding/decoding on top of `rosc`

use rosc::{OscPacket, OscType};
use serde::Serialize;
use std::fmt;

use super::OscArg;
use crate::error::CodecError;

/// A decoded or outgoing OSC message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub path: String,
    pub args: Vec<OscArg>,
}

impl Message {
    pub fn new(path: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Reject addresses that are not OSC paths
pub fn validate_path(path: &str) -> Result<(), CodecError> {
    if path.starts_with('/') && !path.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(CodecError::InvalidPath(path.to_string()))
    }
}

/// Serialize a message into a single OSC packet
pub fn encode_message(path: &str, args: &[OscArg]) -> Result<Vec<u8>, CodecError> {
    validate_path(path)?;

    let packet = OscPacket::Message(rosc::OscMessage {
        addr: path.to_string(),
        args: args.iter().map(OscArg::to_osc).collect::<Vec<OscType>>(),
    });

    rosc::encoder::encode(&packet).map_err(|e| CodecError::Encode(format!("{:?}", e)))
}

/// Decode one OSC packet, flattening bundles into their messages in order
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<Message>, CodecError> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| CodecError::Decode(format!("{:?}", e)))?;

    let mut messages = Vec::new();
    flatten(packet, &mut messages)?;
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<Message>) -> Result<(), CodecError> {
    match packet {
        OscPacket::Message(msg) => {
            let path = msg.addr;
            let args = msg
                .args
                .into_iter()
                .map(|arg| OscArg::from_osc(&path, arg))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Message { path, args });
        },
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out)?;
            }
        },
    }
    Ok(())
}
