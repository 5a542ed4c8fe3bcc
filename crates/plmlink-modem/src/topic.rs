use std::fmt;

use plmlink_frame::code::code_name;
use plmlink_frame::{Ack, Address, Frame, MsgType, Outbound};

use crate::catalog::CommandCatalog;

/// Pseudo address used for modem-local commands and reports.
pub const MODEM: &str = "modem";

const ACK_PREFIX: &str = "ack.";
const NAK_PREFIX: &str = "nak.";

/// Correlation key routing a frame to its consumer.
///
/// Grammar: `[ack.|nak.]<address>.<command>.<variant>[.<group>]`, where
/// `<address>` is the lowercase hex device address or `modem`, and
/// `<variant>` is the message type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Topic for a message to or from a device.
    ///
    /// The group segment is only added for group-addressed message types.
    pub fn device(address: Address, command: &str, variant: MsgType, group: Option<u8>) -> Self {
        let mut topic = format!("{}.{command}.{}", address.hex(), variant.name());
        if let Some(group) = group.filter(|_| variant.is_group()) {
            topic.push_str(&format!(".{group}"));
        }
        Topic(topic)
    }

    /// Topic for a modem-local command or report.
    pub fn modem(command: &str) -> Self {
        Topic(format!("{MODEM}.{command}.{}", MsgType::Direct.name()))
    }

    /// Local acknowledgement topic for this command topic.
    pub fn with_ack(&self, ack: Ack) -> Self {
        let prefix = match ack {
            Ack::Ack => ACK_PREFIX,
            Ack::Nak => NAK_PREFIX,
        };
        Topic(format!("{prefix}{}", self.base()))
    }

    /// The base topic with a different message variant.
    pub fn with_variant(&self, variant: MsgType) -> Self {
        let mut parts: Vec<&str> = self.base().split('.').collect();
        if parts.len() >= 3 {
            parts[2] = variant.name();
        }
        Topic(parts.join("."))
    }

    /// Name the topic a frame is routed under.
    pub fn for_frame(frame: &Frame, catalog: &dyn CommandCatalog) -> Self {
        match frame {
            Frame::Standard(msg) => Topic::device(
                msg.from,
                &catalog.name_or_code(msg.cmd1, msg.cmd2),
                msg.flags.msg_type,
                msg.group(),
            ),
            Frame::Echo {
                command: Outbound::SendStandard(msg),
                ack,
            } => Topic::device(
                msg.to,
                &catalog.name_or_code(msg.cmd1, msg.cmd2),
                msg.flags.msg_type,
                None,
            )
            .with_ack(*ack),
            Frame::Echo { command, ack } => Topic::modem(code_name(command.code())).with_ack(*ack),
            Frame::ModemInfo(info) => Topic::modem(code_name(frame.code())).with_ack(info.ack),
            Frame::ModemConfig(cfg) => Topic::modem(code_name(frame.code())).with_ack(cfg.ack),
            other => Topic::modem(code_name(other.code())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `ack.` / `nak.` topics.
    pub fn is_local_ack(&self) -> bool {
        self.0.starts_with(ACK_PREFIX) || self.0.starts_with(NAK_PREFIX)
    }

    /// The topic without its acknowledgement prefix.
    pub fn base(&self) -> &str {
        self.0
            .strip_prefix(ACK_PREFIX)
            .or_else(|| self.0.strip_prefix(NAK_PREFIX))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Topic(value.to_string())
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Topic(value)
    }
}

#[cfg(test)]
mod tests {
    use plmlink_frame::{AllLinkRecord, ExtData, MsgFlags, StandardMessage};

    use super::*;
    use crate::catalog::BasicCatalog;

    fn device() -> Address {
        Address::new(0x1a, 0x2b, 0x3c)
    }

    #[test]
    fn device_topic_grammar() {
        let topic = Topic::device(device(), "on", MsgType::AllLinkBroadcast, Some(1));
        assert_eq!(topic.as_str(), "1a2b3c.on.all_link_broadcast.1");

        let direct = Topic::device(device(), "on", MsgType::Direct, Some(1));
        assert_eq!(direct.as_str(), "1a2b3c.on.direct");
    }

    #[test]
    fn ack_prefixes() {
        let topic = Topic::device(device(), "read_write_aldb", MsgType::Direct, None);
        let ack = topic.with_ack(Ack::Ack);
        assert_eq!(ack.as_str(), "ack.1a2b3c.read_write_aldb.direct");
        assert!(ack.is_local_ack());
        assert_eq!(
            ack.with_ack(Ack::Nak).as_str(),
            "nak.1a2b3c.read_write_aldb.direct"
        );
        assert_eq!(ack.base(), topic.as_str());
    }

    #[test]
    fn variant_swap() {
        let topic = Topic::device(device(), "on", MsgType::Direct, None);
        assert_eq!(
            topic.with_variant(MsgType::DirectAck).as_str(),
            "1a2b3c.on.direct_ack"
        );
    }

    #[test]
    fn inbound_message_topic() {
        let msg = StandardMessage::standard(
            device(),
            Address::new(0, 0, 2),
            MsgFlags::new(MsgType::AllLinkBroadcast, false),
            0x11,
            0x00,
        );
        let topic = Topic::for_frame(&Frame::Standard(msg), &BasicCatalog);
        assert_eq!(topic.as_str(), "1a2b3c.on.all_link_broadcast.2");
    }

    #[test]
    fn direct_echo_topic_uses_destination() {
        let msg = StandardMessage::extended(
            Address::default(),
            device(),
            MsgFlags::new(MsgType::Direct, true),
            0x2f,
            0x00,
            ExtData::zeroed(),
        );
        let frame = Frame::Echo {
            command: Outbound::SendStandard(msg),
            ack: Ack::Nak,
        };
        assert_eq!(
            Topic::for_frame(&frame, &BasicCatalog).as_str(),
            "nak.1a2b3c.read_write_aldb.direct"
        );
    }

    #[test]
    fn modem_topics() {
        let echo = Frame::Echo {
            command: Outbound::GetNextAllLink,
            ack: Ack::Ack,
        };
        assert_eq!(
            Topic::for_frame(&echo, &BasicCatalog).as_str(),
            "ack.modem.get_next_all_link.direct"
        );

        let record = Frame::AllLinkRecord(AllLinkRecord {
            flags: 0xe2,
            group: 0,
            address: device(),
            data: [0; 3],
        });
        assert_eq!(
            Topic::for_frame(&record, &BasicCatalog).as_str(),
            "modem.all_link_record.direct"
        );
    }

    #[test]
    fn unknown_command_falls_back_to_code() {
        let msg = StandardMessage::standard(
            device(),
            Address::new(1, 1, 1),
            MsgFlags::new(MsgType::DirectAck, false),
            0x45,
            0x00,
        );
        assert_eq!(
            Topic::for_frame(&Frame::Standard(msg), &BasicCatalog).as_str(),
            "1a2b3c.cmd_45.direct_ack"
        );
    }
}
