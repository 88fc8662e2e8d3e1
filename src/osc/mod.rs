//! OSC argument codec, packet codec and stream framing

pub mod args;
pub mod codec;
pub mod framing;
pub mod parse;

pub use args::{ArgType, BlobEncoding, OscArg};
pub use codec::{decode_packet, encode_message, validate_path, Message};
pub use framing::{FrameDecoder, Framing};
pub use parse::parse_arguments;
