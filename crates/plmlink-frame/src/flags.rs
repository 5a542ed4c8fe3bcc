use std::fmt;

/// Message type carried in bits 7-5 of the message-flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Direct,
    DirectAck,
    AllLinkCleanup,
    AllLinkCleanupAck,
    Broadcast,
    DirectNak,
    AllLinkBroadcast,
    AllLinkCleanupNak,
}

impl MsgType {
    /// Decode from the three type bits (already shifted down).
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => MsgType::Direct,
            1 => MsgType::DirectAck,
            2 => MsgType::AllLinkCleanup,
            3 => MsgType::AllLinkCleanupAck,
            4 => MsgType::Broadcast,
            5 => MsgType::DirectNak,
            6 => MsgType::AllLinkBroadcast,
            _ => MsgType::AllLinkCleanupNak,
        }
    }

    /// The three type bits (not shifted).
    pub fn bits(self) -> u8 {
        match self {
            MsgType::Direct => 0,
            MsgType::DirectAck => 1,
            MsgType::AllLinkCleanup => 2,
            MsgType::AllLinkCleanupAck => 3,
            MsgType::Broadcast => 4,
            MsgType::DirectNak => 5,
            MsgType::AllLinkBroadcast => 6,
            MsgType::AllLinkCleanupNak => 7,
        }
    }

    /// Name used as the variant segment of correlation keys.
    pub fn name(self) -> &'static str {
        match self {
            MsgType::Direct => "direct",
            MsgType::DirectAck => "direct_ack",
            MsgType::AllLinkCleanup => "all_link_cleanup",
            MsgType::AllLinkCleanupAck => "all_link_cleanup_ack",
            MsgType::Broadcast => "broadcast",
            MsgType::DirectNak => "direct_nak",
            MsgType::AllLinkBroadcast => "all_link_broadcast",
            MsgType::AllLinkCleanupNak => "all_link_cleanup_nak",
        }
    }

    /// Broadcast and cleanup frames may legitimately arrive more than once
    /// through repeater devices.
    pub fn may_repeat(self) -> bool {
        matches!(
            self,
            MsgType::Broadcast | MsgType::AllLinkBroadcast | MsgType::AllLinkCleanup
        )
    }

    /// Group-addressed messages carry a group number.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            MsgType::AllLinkBroadcast
                | MsgType::AllLinkCleanup
                | MsgType::AllLinkCleanupAck
                | MsgType::AllLinkCleanupNak
        )
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bit-packed message-flags byte.
///
/// ```text
/// bit  7 6 5 | 4        | 3 2         | 1 0
///      type  | extended | hops left   | max hops
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgFlags {
    pub msg_type: MsgType,
    pub extended: bool,
    pub hops_left: u8,
    pub max_hops: u8,
}

impl MsgFlags {
    /// Extended-message bit.
    pub const EXTENDED_BIT: u8 = 0x10;

    /// Flags with the default 3/3 hop budget used for outbound commands.
    pub fn new(msg_type: MsgType, extended: bool) -> Self {
        Self {
            msg_type,
            extended,
            hops_left: 3,
            max_hops: 3,
        }
    }

    /// Decode a flags byte. Every byte value is valid.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            msg_type: MsgType::from_bits(byte >> 5),
            extended: byte & Self::EXTENDED_BIT != 0,
            hops_left: (byte >> 2) & 0b11,
            max_hops: byte & 0b11,
        }
    }

    /// Encode to a flags byte. Hop counts are truncated to two bits.
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.msg_type.bits() << 5;
        if self.extended {
            byte |= Self::EXTENDED_BIT;
        }
        byte | ((self.hops_left & 0b11) << 2) | (self.max_hops & 0b11)
    }

    /// Routing equality: compares type and extended bit, ignores hops.
    pub fn routes_like(&self, other: &MsgFlags) -> bool {
        self.msg_type == other.msg_type && self.extended == other.extended
    }
}

impl fmt::Display for MsgFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} hops {}/{}",
            self.msg_type,
            if self.extended { " ext" } else { "" },
            self.hops_left,
            self.max_hops
        )
    }
}

/// Partially specified flags used when matching inbound frames.
///
/// `None` fields are wildcards. Hop counts are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagsTemplate {
    pub msg_type: Option<MsgType>,
    pub extended: Option<bool>,
}

impl FlagsTemplate {
    /// Match any flags.
    pub const ANY: FlagsTemplate = FlagsTemplate {
        msg_type: None,
        extended: None,
    };

    /// Match a specific message type, either length.
    pub fn of_type(msg_type: MsgType) -> Self {
        Self {
            msg_type: Some(msg_type),
            extended: None,
        }
    }

    /// Restrict the extended bit.
    pub fn with_extended(mut self, extended: bool) -> Self {
        self.extended = Some(extended);
        self
    }

    /// True when every specified field equals the corresponding flag.
    pub fn matches(&self, flags: &MsgFlags) -> bool {
        self.msg_type.is_none_or(|t| t == flags.msg_type)
            && self.extended.is_none_or(|e| e == flags.extended)
    }
}
