//! Link-database (ALDB) mirror and synchronization for Insteon devices.
//!
//! Every Insteon device keeps a small table of links in its own memory,
//! stored top-down in 8-byte records and terminated by a high-water-mark
//! record. [`Aldb`] mirrors one such table locally; [`AldbSync`] loads it
//! from the device through a [`LinkDatabaseProtocol`] and writes staged
//! changes back, announcing each applied change as a [`LinkChange`].

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod record;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use error::{AldbError, Result};
pub use events::{LinkChange, LinkChangeKind};
pub use protocol::{
    DeviceAldbProtocol, LinkDatabaseProtocol, ModemAldbProtocol, DEVICE_FIRST_ADDRESS,
    MODEM_FIRST_ADDRESS,
};
pub use record::{ControlFlags, LinkRecord, RECORD_SIZE};
pub use store::{derive_status, Aldb, AldbSnapshot, LoadStatus, PendingKey};
pub use sync::{AldbSync, ReadStrategy};
