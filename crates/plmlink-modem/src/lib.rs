//! Command/response correlation for an Insteon PowerLinc modem.
//!
//! A [`Modem`] owns the transport, decodes the inbound byte stream, names
//! every frame with a [`Topic`], and routes it to exactly one consumer: the
//! waiter registered for that topic, else the subscriber, else the
//! unhandled channel.
//!
//! Sending follows the modem's two-stage acknowledgement: the modem echoes
//! each command with a local ACK/NAK, and direct commands are then
//! confirmed (or rejected) by the remote device. Every send resolves to a
//! [`ResultCode`].

pub mod catalog;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod handler;
pub mod modem;
pub mod outcome;
pub mod topic;

pub use catalog::{BasicCatalog, CommandCatalog};
pub use config::ModemConfig;
pub use dedup::Deduplicator;
pub use dispatch::{Delivery, Subscription, Waiter};
pub use error::{ModemError, Result};
pub use guard::{KeyGuard, KeyedLocks};
pub use handler::{
    AwaitsDeviceAck, AwaitsLocalAck, BroadcastListener, DeduplicatesBroadcast, DirectCommand,
    ModemCommand, Sendable,
};
pub use modem::{Exchange, Modem};
pub use outcome::ResultCode;
pub use topic::{Topic, MODEM};
