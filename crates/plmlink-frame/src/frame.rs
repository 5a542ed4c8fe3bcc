use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::code::{self, ACK, EXT_DATA_LEN, NAK, START};
use crate::data::ExtData;
use crate::flags::{MsgFlags, MsgType};

/// Local acknowledgement appended by the modem to every echoed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ack {
    Ack,
    Nak,
}

impl Ack {
    /// Any byte other than `0x06` is treated as a NAK.
    pub fn from_byte(byte: u8) -> Self {
        if byte == ACK {
            Ack::Ack
        } else {
            Ack::Nak
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Ack::Ack => ACK,
            Ack::Nak => NAK,
        }
    }

    pub fn is_ack(self) -> bool {
        self == Ack::Ack
    }
}

/// A standard or extended Insteon message.
///
/// Inbound (`0x50`/`0x51`) messages have a sender; outbound (`0x62`)
/// messages only have a destination, and use [`StandardMessage::to`] with
/// `from` left at the default address.
///
/// `data` decides whether a message is extended. The constructors keep
/// `flags.extended` in step with it; encoding, equality and hashing ignore
/// `flags.extended` and use `data` instead.
#[derive(Debug, Clone, Copy)]
pub struct StandardMessage {
    pub from: Address,
    pub to: Address,
    pub flags: MsgFlags,
    pub cmd1: u8,
    pub cmd2: u8,
    pub data: Option<ExtData>,
}

impl StandardMessage {
    /// A standard-length message.
    pub fn standard(from: Address, to: Address, mut flags: MsgFlags, cmd1: u8, cmd2: u8) -> Self {
        flags.extended = false;
        Self {
            from,
            to,
            flags,
            cmd1,
            cmd2,
            data: None,
        }
    }

    /// An extended-length message.
    pub fn extended(
        from: Address,
        to: Address,
        mut flags: MsgFlags,
        cmd1: u8,
        cmd2: u8,
        data: ExtData,
    ) -> Self {
        flags.extended = true;
        Self {
            from,
            to,
            flags,
            cmd1,
            cmd2,
            data: Some(data),
        }
    }

    /// Group number for group-addressed messages.
    ///
    /// All-link broadcasts carry the group in the low byte of the
    /// destination; cleanup messages carry it in `cmd2`.
    pub fn group(&self) -> Option<u8> {
        match self.flags.msg_type {
            MsgType::AllLinkBroadcast => Some(self.to.low()),
            MsgType::AllLinkCleanup | MsgType::AllLinkCleanupAck | MsgType::AllLinkCleanupNak => {
                Some(self.cmd2)
            }
            _ => None,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.data.is_some()
    }

    /// Flags with the extended bit taken from `data`.
    pub fn effective_flags(&self) -> MsgFlags {
        MsgFlags {
            extended: self.data.is_some(),
            ..self.flags
        }
    }

    fn wire_flags(&self) -> u8 {
        self.effective_flags().to_byte()
    }

    fn key(&self) -> (Address, Address, MsgFlags, u8, u8, Option<ExtData>) {
        (
            self.from,
            self.to,
            self.effective_flags(),
            self.cmd1,
            self.cmd2,
            self.data,
        )
    }

    fn put_payload(&self, dst: &mut BytesMut) {
        if let Some(data) = &self.data {
            dst.put_slice(data.bytes());
        }
    }
}

impl PartialEq for StandardMessage {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for StandardMessage {}

impl Hash for StandardMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Modem identity returned by `0x60`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModemInfo {
    pub address: Address,
    pub category: u8,
    pub subcategory: u8,
    pub firmware: u8,
    pub ack: Ack,
}

/// Modem configuration flags returned by `0x73`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModemConfig {
    pub flags: u8,
    pub spare1: u8,
    pub spare2: u8,
    pub ack: Ack,
}

/// Linking-mode completion report (`0x53`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllLinkComplete {
    /// 0x00 responder, 0x01 controller, 0xFF deleted.
    pub link_code: u8,
    pub group: u8,
    pub address: Address,
    pub category: u8,
    pub subcategory: u8,
    pub firmware: u8,
}

/// All-link cleanup failure report (`0x56`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllLinkFailure {
    pub code: u8,
    pub group: u8,
    pub address: Address,
}

/// One record of the modem's own link database (`0x57`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllLinkRecord {
    pub flags: u8,
    pub group: u8,
    pub address: Address,
    pub data: [u8; 3],
}

/// Modem link-database management request (`0x6F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManageRecord {
    pub control: u8,
    pub flags: u8,
    pub group: u8,
    pub address: Address,
    pub data: [u8; 3],
}

impl ManageRecord {
    pub const FIND_FIRST: u8 = 0x00;
    pub const FIND_NEXT: u8 = 0x01;
    pub const UPDATE: u8 = 0x20;
    pub const ADD_CONTROLLER: u8 = 0x40;
    pub const ADD_RESPONDER: u8 = 0x41;
    pub const DELETE: u8 = 0x80;
}

/// Host commands whose reply is the command echoed back plus an ACK byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outbound {
    SendAllLink { group: u8, cmd1: u8, cmd2: u8 },
    SendStandard(StandardMessage),
    X10Send { raw: u8, flag: u8 },
    StartAllLink { link_code: u8, group: u8 },
    CancelAllLink,
    Reset,
    GetFirstAllLink,
    GetNextAllLink,
    SetConfig { flags: u8 },
    ManageAllLink(ManageRecord),
}

impl Outbound {
    pub fn code(&self) -> u8 {
        match self {
            Outbound::SendAllLink { .. } => code::SEND_ALL_LINK,
            Outbound::SendStandard(_) => code::SEND_STANDARD,
            Outbound::X10Send { .. } => code::X10_SEND,
            Outbound::StartAllLink { .. } => code::START_ALL_LINK,
            Outbound::CancelAllLink => code::CANCEL_ALL_LINK,
            Outbound::Reset => code::RESET,
            Outbound::GetFirstAllLink => code::GET_FIRST_ALL_LINK,
            Outbound::GetNextAllLink => code::GET_NEXT_ALL_LINK,
            Outbound::SetConfig { .. } => code::SET_CONFIG,
            Outbound::ManageAllLink(_) => code::MANAGE_ALL_LINK,
        }
    }

    /// Write the host-to-modem request form (no ACK byte).
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u8(START);
        dst.put_u8(self.code());
        match self {
            Outbound::SendAllLink { group, cmd1, cmd2 } => {
                dst.put_slice(&[*group, *cmd1, *cmd2]);
            }
            Outbound::SendStandard(msg) => {
                dst.put_slice(&msg.to.bytes());
                dst.put_u8(msg.wire_flags());
                dst.put_slice(&[msg.cmd1, msg.cmd2]);
                msg.put_payload(dst);
            }
            Outbound::X10Send { raw, flag } => dst.put_slice(&[*raw, *flag]),
            Outbound::StartAllLink { link_code, group } => dst.put_slice(&[*link_code, *group]),
            Outbound::SetConfig { flags } => dst.put_u8(*flags),
            Outbound::ManageAllLink(rec) => {
                dst.put_slice(&[rec.control, rec.flags, rec.group]);
                dst.put_slice(&rec.address.bytes());
                dst.put_slice(&rec.data);
            }
            Outbound::CancelAllLink
            | Outbound::Reset
            | Outbound::GetFirstAllLink
            | Outbound::GetNextAllLink => {}
        }
    }

    /// Encode the request form to a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(22);
        self.write_to(&mut dst);
        dst.freeze()
    }

    fn parse(code: u8, body: &[u8]) -> Option<Self> {
        let cmd = match code {
            code::SEND_ALL_LINK => Outbound::SendAllLink {
                group: body[0],
                cmd1: body[1],
                cmd2: body[2],
            },
            code::SEND_STANDARD => {
                let to = Address::from_slice(&body[0..3]);
                let flags = MsgFlags::from_byte(body[3]);
                let msg = if flags.extended {
                    StandardMessage::extended(
                        Address::default(),
                        to,
                        flags,
                        body[4],
                        body[5],
                        ExtData::from_slice(&body[6..6 + EXT_DATA_LEN]),
                    )
                } else {
                    StandardMessage::standard(Address::default(), to, flags, body[4], body[5])
                };
                Outbound::SendStandard(msg)
            }
            code::X10_SEND => Outbound::X10Send {
                raw: body[0],
                flag: body[1],
            },
            code::START_ALL_LINK => Outbound::StartAllLink {
                link_code: body[0],
                group: body[1],
            },
            code::CANCEL_ALL_LINK => Outbound::CancelAllLink,
            code::RESET => Outbound::Reset,
            code::GET_FIRST_ALL_LINK => Outbound::GetFirstAllLink,
            code::GET_NEXT_ALL_LINK => Outbound::GetNextAllLink,
            code::SET_CONFIG => Outbound::SetConfig { flags: body[0] },
            code::MANAGE_ALL_LINK => Outbound::ManageAllLink(ManageRecord {
                control: body[0],
                flags: body[1],
                group: body[2],
                address: Address::from_slice(&body[3..6]),
                data: [body[6], body[7], body[8]],
            }),
            _ => return None,
        };
        Some(cmd)
    }
}

/// Anything the host can send to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// `0x60`: the reply carries the modem's identity instead of an echo.
    GetInfo,
    /// `0x73`: the reply carries configuration flags instead of an echo.
    GetConfig,
    /// Commands answered with an echo plus ACK/NAK.
    Outbound(Outbound),
}

impl Request {
    pub fn code(&self) -> u8 {
        match self {
            Request::GetInfo => code::GET_INFO,
            Request::GetConfig => code::GET_CONFIG,
            Request::Outbound(cmd) => cmd.code(),
        }
    }

    /// Write the request bytes.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Request::GetInfo | Request::GetConfig => {
                dst.put_u8(START);
                dst.put_u8(self.code());
            }
            Request::Outbound(cmd) => cmd.write_to(dst),
        }
    }

    /// Encode the request to a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(24);
        self.write_to(&mut dst);
        dst.freeze()
    }
}

impl From<Outbound> for Request {
    fn from(cmd: Outbound) -> Self {
        Request::Outbound(cmd)
    }
}

/// A complete frame as it arrives from the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    /// `0x50` / `0x51`: standard or extended message from the network.
    Standard(StandardMessage),
    /// `0x52`
    X10Received { raw: u8, flag: u8 },
    /// `0x53`
    AllLinkComplete(AllLinkComplete),
    /// `0x54`: set-button press on the modem.
    ButtonEvent(u8),
    /// `0x55`
    UserReset,
    /// `0x56`
    AllLinkFailure(AllLinkFailure),
    /// `0x57`
    AllLinkRecord(AllLinkRecord),
    /// `0x58`
    AllLinkCleanupStatus(Ack),
    /// Reply to `0x60`.
    ModemInfo(ModemInfo),
    /// Reply to `0x73`.
    ModemConfig(ModemConfig),
    /// Echo of a host command with its local ACK/NAK.
    Echo { command: Outbound, ack: Ack },
}

impl Frame {
    /// The message code this frame is encoded with.
    pub fn code(&self) -> u8 {
        match self {
            Frame::Standard(msg) if msg.is_extended() => code::EXTENDED_RECEIVED,
            Frame::Standard(_) => code::STANDARD_RECEIVED,
            Frame::X10Received { .. } => code::X10_RECEIVED,
            Frame::AllLinkComplete(_) => code::ALL_LINK_COMPLETE,
            Frame::ButtonEvent(_) => code::BUTTON_EVENT,
            Frame::UserReset => code::USER_RESET,
            Frame::AllLinkFailure(_) => code::ALL_LINK_FAILURE,
            Frame::AllLinkRecord(_) => code::ALL_LINK_RECORD,
            Frame::AllLinkCleanupStatus(_) => code::ALL_LINK_CLEANUP_STATUS,
            Frame::ModemInfo(_) => code::GET_INFO,
            Frame::ModemConfig(_) => code::GET_CONFIG,
            Frame::Echo { command, .. } => command.code(),
        }
    }

    /// Total wire length of this frame.
    pub fn wire_size(&self) -> usize {
        let base = code::base_len(self.code()).unwrap_or(2);
        match self {
            Frame::Standard(msg)
            | Frame::Echo {
                command: Outbound::SendStandard(msg),
                ..
            } if msg.is_extended() => base + EXT_DATA_LEN,
            _ => base,
        }
    }

    /// Write the modem-to-host wire form.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        match self {
            Frame::Echo { command, ack } => {
                command.write_to(dst);
                dst.put_u8(ack.to_byte());
                return;
            }
            _ => {
                dst.put_u8(START);
                dst.put_u8(self.code());
            }
        }

        match self {
            Frame::Standard(msg) => {
                dst.put_slice(&msg.from.bytes());
                dst.put_slice(&msg.to.bytes());
                dst.put_u8(msg.wire_flags());
                dst.put_slice(&[msg.cmd1, msg.cmd2]);
                msg.put_payload(dst);
            }
            Frame::X10Received { raw, flag } => dst.put_slice(&[*raw, *flag]),
            Frame::AllLinkComplete(c) => {
                dst.put_slice(&[c.link_code, c.group]);
                dst.put_slice(&c.address.bytes());
                dst.put_slice(&[c.category, c.subcategory, c.firmware]);
            }
            Frame::ButtonEvent(event) => dst.put_u8(*event),
            Frame::UserReset => {}
            Frame::AllLinkFailure(f) => {
                dst.put_slice(&[f.code, f.group]);
                dst.put_slice(&f.address.bytes());
            }
            Frame::AllLinkRecord(r) => {
                dst.put_slice(&[r.flags, r.group]);
                dst.put_slice(&r.address.bytes());
                dst.put_slice(&r.data);
            }
            Frame::AllLinkCleanupStatus(ack) => dst.put_u8(ack.to_byte()),
            Frame::ModemInfo(info) => {
                dst.put_slice(&info.address.bytes());
                dst.put_slice(&[info.category, info.subcategory, info.firmware]);
                dst.put_u8(info.ack.to_byte());
            }
            Frame::ModemConfig(cfg) => {
                dst.put_slice(&[cfg.flags, cfg.spare1, cfg.spare2]);
                dst.put_u8(cfg.ack.to_byte());
            }
            Frame::Echo { .. } => {}
        }
    }

    /// Encode to a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.write_to(&mut dst);
        dst.freeze()
    }

    /// Parse a buffer holding exactly one complete frame of known length.
    pub(crate) fn parse(buf: &[u8]) -> Option<Self> {
        let code = buf[1];
        let body = &buf[2..];
        let frame = match code {
            code::STANDARD_RECEIVED | code::EXTENDED_RECEIVED => {
                let from = Address::from_slice(&body[0..3]);
                let to = Address::from_slice(&body[3..6]);
                let flags = MsgFlags::from_byte(body[6]);
                let msg = if code == code::EXTENDED_RECEIVED || flags.extended {
                    StandardMessage::extended(
                        from,
                        to,
                        flags,
                        body[7],
                        body[8],
                        ExtData::from_slice(&body[9..9 + EXT_DATA_LEN]),
                    )
                } else {
                    StandardMessage::standard(from, to, flags, body[7], body[8])
                };
                Frame::Standard(msg)
            }
            code::X10_RECEIVED => Frame::X10Received {
                raw: body[0],
                flag: body[1],
            },
            code::ALL_LINK_COMPLETE => Frame::AllLinkComplete(AllLinkComplete {
                link_code: body[0],
                group: body[1],
                address: Address::from_slice(&body[2..5]),
                category: body[5],
                subcategory: body[6],
                firmware: body[7],
            }),
            code::BUTTON_EVENT => Frame::ButtonEvent(body[0]),
            code::USER_RESET => Frame::UserReset,
            code::ALL_LINK_FAILURE => Frame::AllLinkFailure(AllLinkFailure {
                code: body[0],
                group: body[1],
                address: Address::from_slice(&body[2..5]),
            }),
            code::ALL_LINK_RECORD => Frame::AllLinkRecord(AllLinkRecord {
                flags: body[0],
                group: body[1],
                address: Address::from_slice(&body[2..5]),
                data: [body[5], body[6], body[7]],
            }),
            code::ALL_LINK_CLEANUP_STATUS => Frame::AllLinkCleanupStatus(Ack::from_byte(body[0])),
            code::GET_INFO => Frame::ModemInfo(ModemInfo {
                address: Address::from_slice(&body[0..3]),
                category: body[3],
                subcategory: body[4],
                firmware: body[5],
                ack: Ack::from_byte(body[6]),
            }),
            code::GET_CONFIG => Frame::ModemConfig(ModemConfig {
                flags: body[0],
                spare1: body[1],
                spare2: body[2],
                ack: Ack::from_byte(body[3]),
            }),
            other => {
                let (ack, cmd_body) = body.split_last()?;
                Frame::Echo {
                    command: Outbound::parse(other, cmd_body)?,
                    ack: Ack::from_byte(*ack),
                }
            }
        };
        Some(frame)
    }
}

impl From<StandardMessage> for Frame {
    fn from(msg: StandardMessage) -> Self {
        Frame::Standard(msg)
    }
}
