//! OSC Console Gateway
//!
//! Remote control and feedback for digital mixing consoles over OSC.
//! One session per instance, over UDP, SLIP-framed TCP or length-prefixed TCP.

pub mod actions;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod osc;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod variables;
