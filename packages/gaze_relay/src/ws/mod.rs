//! Client-facing WebSocket protocol.
//!
//! - `protocol`: request/response types and decoding
//! - `dispatch`: one command, one cache operation, one response
//! - `handler`: per-connection read/answer loop

pub mod dispatch;
mod handler;
mod protocol;

pub use dispatch::{Handled, dispatch, handle_text};
pub use handler::handle_client;
pub use protocol::{Command, ProtocolError, Response, decode_command};
