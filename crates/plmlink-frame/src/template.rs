use crate::address::Address;
use crate::code::EXT_DATA_LEN;
use crate::flags::FlagsTemplate;
use crate::frame::{Frame, StandardMessage};

/// Partially specified standard/extended message used to filter replies.
///
/// Every field is optional; `None` matches anything. A template that
/// constrains any data slot only matches extended messages. Templates
/// cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StandardTemplate {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub flags: FlagsTemplate,
    pub cmd1: Option<u8>,
    pub cmd2: Option<u8>,
    pub data: [Option<u8>; EXT_DATA_LEN],
}

impl StandardTemplate {
    /// Match every standard message.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn from(mut self, address: Address) -> Self {
        self.from = Some(address);
        self
    }

    pub fn to(mut self, address: Address) -> Self {
        self.to = Some(address);
        self
    }

    pub fn flags(mut self, flags: FlagsTemplate) -> Self {
        self.flags = flags;
        self
    }

    pub fn cmd1(mut self, cmd1: u8) -> Self {
        self.cmd1 = Some(cmd1);
        self
    }

    pub fn cmd2(mut self, cmd2: u8) -> Self {
        self.cmd2 = Some(cmd2);
        self
    }

    /// Constrain data slot `Dn` (1-based). Out-of-range slots are ignored.
    pub fn data(mut self, slot: usize, value: u8) -> Self {
        if (1..=EXT_DATA_LEN).contains(&slot) {
            self.data[slot - 1] = Some(value);
        }
        self
    }

    /// True when every specified field equals the message's.
    pub fn matches(&self, msg: &StandardMessage) -> bool {
        if !(self.from.is_none_or(|a| a == msg.from)
            && self.to.is_none_or(|a| a == msg.to)
            && self.flags.matches(&msg.effective_flags())
            && self.cmd1.is_none_or(|c| c == msg.cmd1)
            && self.cmd2.is_none_or(|c| c == msg.cmd2))
        {
            return false;
        }

        if self.data.iter().all(Option::is_none) {
            return true;
        }
        let Some(payload) = &msg.data else {
            return false;
        };
        self.data
            .iter()
            .zip(payload.bytes())
            .all(|(want, have)| want.is_none_or(|w| w == *have))
    }

    /// Match against any frame; non-message frames never match.
    pub fn matches_frame(&self, frame: &Frame) -> bool {
        match frame {
            Frame::Standard(msg) => self.matches(msg),
            _ => false,
        }
    }
}
