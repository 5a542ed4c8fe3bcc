//! Command capabilities.
//!
//! A command is assembled from small traits instead of a type hierarchy:
//! anything [`Sendable`] can be written to the modem, [`AwaitsLocalAck`]
//! commands resolve on the modem's echo, and [`AwaitsDeviceAck`] commands
//! additionally wait for the addressed device. [`DeduplicatesBroadcast`]
//! marks inbound listeners whose frames may arrive more than once.

use plmlink_frame::code::code_name;
use plmlink_frame::{
    Ack, Address, ExtData, MsgFlags, MsgType, Outbound, Request, StandardMessage,
    StandardTemplate,
};

use crate::catalog::CommandCatalog;
use crate::topic::Topic;

/// Something that can be written to the modem.
pub trait Sendable: Send + Sync {
    /// The request bytes to write.
    fn request(&self) -> Request;

    /// Correlation key; the per-key guard is held on it for the whole
    /// exchange.
    fn topic(&self, catalog: &dyn CommandCatalog) -> Topic;
}

/// Resolved by the modem's local ACK/NAK echo.
pub trait AwaitsLocalAck: Sendable {
    /// Topics carrying the ACK and NAK echo.
    fn local_ack_topics(&self, catalog: &dyn CommandCatalog) -> [Topic; 2] {
        let topic = self.topic(catalog);
        [topic.with_ack(Ack::Ack), topic.with_ack(Ack::Nak)]
    }
}

/// Additionally resolved by a direct ACK/NAK from the addressed device.
pub trait AwaitsDeviceAck: AwaitsLocalAck {
    /// Topics carrying the device's direct ACK and direct NAK.
    fn device_ack_topics(&self, catalog: &dyn CommandCatalog) -> [Topic; 2] {
        let topic = self.topic(catalog);
        [
            topic.with_variant(MsgType::DirectAck),
            topic.with_variant(MsgType::DirectNak),
        ]
    }

    /// Narrows which device replies resolve the command.
    fn reply_template(&self) -> Option<StandardTemplate> {
        None
    }
}

/// An inbound listener whose frames are collapsed when repeated.
pub trait DeduplicatesBroadcast {
    /// Topic whose repeated frames are one event.
    fn broadcast_topic(&self, catalog: &dyn CommandCatalog) -> Topic;
}

/// A standard or extended message addressed to one device (`0x62`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCommand {
    pub address: Address,
    pub cmd1: u8,
    pub cmd2: u8,
    pub data: Option<ExtData>,
    pub max_hops: u8,
    pub template: Option<StandardTemplate>,
}

impl DirectCommand {
    /// A standard-length direct command.
    pub fn standard(address: Address, cmd1: u8, cmd2: u8) -> Self {
        Self {
            address,
            cmd1,
            cmd2,
            data: None,
            max_hops: 3,
            template: None,
        }
    }

    /// An extended-length direct command.
    pub fn extended(address: Address, cmd1: u8, cmd2: u8, data: ExtData) -> Self {
        Self {
            data: Some(data),
            ..Self::standard(address, cmd1, cmd2)
        }
    }

    /// Only accept device replies matching `template`.
    pub fn with_template(mut self, template: StandardTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Override the hop budget (0-3).
    pub fn with_max_hops(mut self, hops: u8) -> Self {
        self.max_hops = hops.min(3);
        self
    }

    /// The outbound message.
    pub fn message(&self) -> StandardMessage {
        let flags = MsgFlags {
            hops_left: self.max_hops,
            max_hops: self.max_hops,
            ..MsgFlags::new(MsgType::Direct, self.data.is_some())
        };
        match self.data {
            Some(data) => StandardMessage::extended(
                Address::default(),
                self.address,
                flags,
                self.cmd1,
                self.cmd2,
                data,
            ),
            None => StandardMessage::standard(
                Address::default(),
                self.address,
                flags,
                self.cmd1,
                self.cmd2,
            ),
        }
    }
}

impl Sendable for DirectCommand {
    fn request(&self) -> Request {
        Request::Outbound(Outbound::SendStandard(self.message()))
    }

    fn topic(&self, catalog: &dyn CommandCatalog) -> Topic {
        Topic::device(
            self.address,
            &catalog.name_or_code(self.cmd1, self.cmd2),
            MsgType::Direct,
            None,
        )
    }
}

impl AwaitsLocalAck for DirectCommand {}

impl AwaitsDeviceAck for DirectCommand {
    fn reply_template(&self) -> Option<StandardTemplate> {
        self.template
    }
}

/// A command handled by the modem itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemCommand(pub Request);

impl ModemCommand {
    pub fn new(request: impl Into<Request>) -> Self {
        Self(request.into())
    }

    pub fn get_info() -> Self {
        Self(Request::GetInfo)
    }

    pub fn get_config() -> Self {
        Self(Request::GetConfig)
    }

    pub fn get_first_all_link() -> Self {
        Self::new(Outbound::GetFirstAllLink)
    }

    pub fn get_next_all_link() -> Self {
        Self::new(Outbound::GetNextAllLink)
    }
}

impl Sendable for ModemCommand {
    fn request(&self) -> Request {
        self.0
    }

    fn topic(&self, _catalog: &dyn CommandCatalog) -> Topic {
        Topic::modem(code_name(self.0.code()))
    }
}

impl AwaitsLocalAck for ModemCommand {}

/// Listener for a device's broadcast or all-link traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastListener {
    pub address: Address,
    pub cmd1: u8,
    pub variant: MsgType,
    pub group: Option<u8>,
}

impl BroadcastListener {
    /// All-link broadcast of `cmd1` to `group`.
    pub fn all_link(address: Address, cmd1: u8, group: u8) -> Self {
        Self {
            address,
            cmd1,
            variant: MsgType::AllLinkBroadcast,
            group: Some(group),
        }
    }

    /// All-link cleanup of `cmd1` for `group`.
    pub fn cleanup(address: Address, cmd1: u8, group: u8) -> Self {
        Self {
            address,
            cmd1,
            variant: MsgType::AllLinkCleanup,
            group: Some(group),
        }
    }

    /// Plain broadcast of `cmd1`.
    pub fn broadcast(address: Address, cmd1: u8) -> Self {
        Self {
            address,
            cmd1,
            variant: MsgType::Broadcast,
            group: None,
        }
    }
}

impl DeduplicatesBroadcast for BroadcastListener {
    fn broadcast_topic(&self, catalog: &dyn CommandCatalog) -> Topic {
        Topic::device(
            self.address,
            &catalog.name_or_code(self.cmd1, 0),
            self.variant,
            self.group,
        )
    }
}
