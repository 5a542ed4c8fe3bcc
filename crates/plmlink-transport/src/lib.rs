//! Byte-stream transport abstraction for PowerLinc modems.
//!
//! The modem is reached through an unstructured, half-duplex byte stream:
//! - a serial/USB port (any `AsyncRead + AsyncWrite` the caller opens)
//! - a TCP socket on a network hub (see [`tcp`])
//!
//! This is the lowest layer of plmlink. Frames are never interpreted here;
//! the stream may split or merge frames arbitrarily.

pub mod error;
pub mod stream;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use stream::{split, InboundBytes, StreamTransport, DEFAULT_INBOUND_CAPACITY};
pub use traits::Transport;
