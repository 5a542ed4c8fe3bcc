//! Byte-exact framing for the PowerLinc modem (PLM) serial protocol.
//!
//! Every frame starts with the `0x02` start marker followed by a one-byte
//! message code. The code fixes the layout and length of the rest of the
//! frame, except for `0x50` and `0x62`: those carry 14 extra payload bytes
//! when the extended bit of their message-flags byte is set. `0x51` always
//! carries the payload.
//!
//! Decoding never panics on short or garbled input: the codec reports that
//! more bytes are needed, or that the buffer does not start with a known
//! frame, and [`FrameReader`] resynchronizes on the next start marker.

pub mod address;
pub mod code;
pub mod codec;
pub mod data;
pub mod error;
pub mod flags;
pub mod frame;
pub mod reader;
pub mod template;

pub use address::Address;
pub use code::{ACK, NAK, START};
pub use codec::{decode, decode_frame, encode_frame, frame_len, PlmCodec};
pub use data::ExtData;
pub use error::{FrameError, Result};
pub use flags::{FlagsTemplate, MsgFlags, MsgType};
pub use frame::{
    Ack, AllLinkComplete, AllLinkFailure, AllLinkRecord, Frame, ManageRecord, ModemConfig,
    ModemInfo, Outbound, Request, StandardMessage,
};
pub use reader::FrameReader;
pub use template::StandardTemplate;
