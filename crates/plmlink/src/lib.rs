//! Host-side driver for Insteon PowerLinc modems.
//!
//! plmlink talks to an Insteon mesh network through a PowerLinc Modem
//! attached over serial, USB or TCP. It decodes the modem's frame protocol,
//! correlates commands with their acknowledgements, and keeps local mirrors
//! of device link databases.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte-stream link to the modem (stream halves, TCP)
//! - [`frame`] - Frame codec, buffering reader and match templates
//! - [`modem`] - Topics, dispatch and the command/acknowledgement engine
//! - [`aldb`] - Link-database mirror and sync engine (behind `aldb` feature)

/// Re-export transport types.
pub mod transport {
    pub use plmlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use plmlink_frame::*;
}

/// Re-export modem driver types.
pub mod modem {
    pub use plmlink_modem::*;
}

/// Re-export link-database types (requires `aldb` feature).
#[cfg(feature = "aldb")]
pub mod aldb {
    pub use plmlink_aldb::*;
}

pub use plmlink_frame::Address;
pub use plmlink_modem::{Modem, ModemConfig, ResultCode};
