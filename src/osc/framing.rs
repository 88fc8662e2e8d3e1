//! Stream framing for OSC over TCP
//!
//! - `Slip`: OSC 1.1 double-ended SLIP (RFC 1055 bytes)
//! - `LengthPrefixed`: OSC 1.0 big-endian u32 size followed by the packet
//!
//! UDP needs no framing: one datagram carries one packet.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::CodecError;

/// Largest packet accepted from a stream
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Stream encapsulation used by a TCP transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Slip,
    LengthPrefixed,
}

impl Framing {
    /// Wrap one encoded packet for the wire
    pub fn frame(self, packet: &[u8]) -> Vec<u8> {
        match self {
            Framing::Slip => {
                let mut out = Vec::with_capacity(packet.len() + 2);
                out.push(END);
                for &byte in packet {
                    match byte {
                        END => out.extend_from_slice(&[ESC, ESC_END]),
                        ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
                        b => out.push(b),
                    }
                }
                out.push(END);
                out
            },
            Framing::LengthPrefixed => {
                let mut out = BytesMut::with_capacity(packet.len() + 4);
                out.put_u32(packet.len() as u32);
                out.put_slice(packet);
                out.to_vec()
            },
        }
    }
}

/// Incremental decoder for a framed byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Append bytes read from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, if one is buffered
    ///
    /// A malformed frame is returned as an error and skipped; decoding can
    /// continue with the following call.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, CodecError>> {
        match self.framing {
            Framing::Slip => self.next_slip(),
            Framing::LengthPrefixed => self.next_prefixed(),
        }
    }

    fn next_slip(&mut self) -> Option<Result<Vec<u8>, CodecError>> {
        loop {
            let end = match self.buf.iter().position(|&b| b == END) {
                Some(end) => end,
                None if self.buf.len() > MAX_FRAME_SIZE => {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Some(Err(CodecError::FrameTooLarge(len)));
                },
                None => return None,
            };
            let raw = self.buf.split_to(end + 1);
            let body = &raw[..end];

            // Double-ended framing yields empty frames between END bytes
            if body.is_empty() {
                continue;
            }
            if body.len() > MAX_FRAME_SIZE {
                return Some(Err(CodecError::FrameTooLarge(body.len())));
            }
            return Some(unescape(body));
        }
    }

    fn next_prefixed(&mut self) -> Option<Result<Vec<u8>, CodecError>> {
        if self.buf.len() < 4 {
            return None;
        }

        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            // The stream cannot be resynchronized past a bad size prefix
            self.buf.clear();
            return Some(Err(CodecError::FrameTooLarge(len)));
        }
        if self.buf.len() < 4 + len {
            return None;
        }

        self.buf.advance(4);
        Some(Ok(self.buf.split_to(len).to_vec()))
    }

    /// Bytes buffered but not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn unescape(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter();
    while let Some(&byte) = bytes.next() {
        if byte != ESC {
            out.push(byte);
            continue;
        }
        match bytes.next() {
            Some(&ESC_END) => out.push(END),
            Some(&ESC_ESC) => out.push(ESC),
            Some(&other) => return Err(CodecError::BadEscape(other)),
            None => return Err(CodecError::BadEscape(ESC)),
        }
    }
    Ok(out)
}
