use std::fmt;

use plmlink_frame::{Address, AllLinkRecord, ExtData};
use serde::{Deserialize, Serialize};

/// Size of one link record in device memory.
pub const RECORD_SIZE: u16 = 8;

const IN_USE_BIT: u8 = 0x80;
const CONTROLLER_BIT: u8 = 0x40;
const USED_BEFORE_BIT: u8 = 0x02;
const SPARE_MASK: u8 = !(IN_USE_BIT | CONTROLLER_BIT | USED_BEFORE_BIT);

/// Decoded record control-flags byte.
///
/// Bit 7 marks the record in use, bit 6 a controller (clear: responder).
/// Bit 1 is set on every record that has ever been written; a record with
/// it clear is the high-water mark ending the table. The remaining bits
/// are device specific and preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize)]
pub struct ControlFlags {
    pub in_use: bool,
    pub controller: bool,
    pub high_water_mark: bool,
    pub spare: u8,
}

impl ControlFlags {
    /// Flags for a fresh in-use record.
    pub fn link(controller: bool) -> Self {
        Self {
            in_use: true,
            controller,
            high_water_mark: false,
            spare: 0,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            in_use: byte & IN_USE_BIT != 0,
            controller: byte & CONTROLLER_BIT != 0,
            high_water_mark: byte & USED_BEFORE_BIT == 0,
            spare: byte & SPARE_MASK,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = self.spare & SPARE_MASK;
        if self.in_use {
            byte |= IN_USE_BIT;
        }
        if self.controller {
            byte |= CONTROLLER_BIT;
        }
        if !self.high_water_mark {
            byte |= USED_BEFORE_BIT;
        }
        byte
    }
}

/// One 8-byte slot of a device link database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    pub mem_address: u16,
    pub flags: ControlFlags,
    pub group: u8,
    pub target: Address,
    pub data: [u8; 3],
}

impl LinkRecord {
    /// An in-use link. The address is assigned when the record is written.
    pub fn new(controller: bool, group: u8, target: Address, data: [u8; 3]) -> Self {
        Self {
            mem_address: 0,
            flags: ControlFlags::link(controller),
            group,
            target,
            data,
        }
    }

    /// The all-zero record ending a table.
    pub fn high_water_mark(mem_address: u16) -> Self {
        Self {
            mem_address,
            flags: ControlFlags {
                high_water_mark: true,
                ..ControlFlags::default()
            },
            group: 0,
            target: Address::default(),
            data: [0; 3],
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.flags.in_use
    }

    pub fn is_controller(&self) -> bool {
        self.flags.controller
    }

    pub fn is_high_water_mark(&self) -> bool {
        self.flags.high_water_mark
    }

    /// Parse a record from an extended `0x2F` read response.
    pub fn from_ext_data(data: &ExtData) -> Self {
        Self {
            mem_address: data.mem_address(),
            flags: ControlFlags::from_byte(data.control_flags()),
            group: data.group(),
            target: data.target(),
            data: data.record_data(),
        }
    }

    /// Build from a modem all-link record at a synthesized address.
    ///
    /// The modem only reports live records, so these never end the table.
    pub fn from_all_link(record: &AllLinkRecord, mem_address: u16) -> Self {
        Self {
            mem_address,
            flags: ControlFlags {
                high_water_mark: false,
                ..ControlFlags::from_byte(record.flags)
            },
            group: record.group,
            target: record.address,
            data: record.data,
        }
    }

    /// Extended payload writing this record to device memory.
    pub fn write_payload(&self) -> ExtData {
        let mut payload = ExtData::zeroed().with(2, 0x02);
        payload.set_mem_address(self.mem_address);
        payload.set(5, RECORD_SIZE as u8);
        payload.set_record(self.flags.to_byte(), self.group, self.target, self.data);
        payload.with_checksum(0x2f, 0x00)
    }

    /// Extended payload requesting `count` records from `mem_address`.
    ///
    /// A count of zero with address zero asks for the whole table.
    pub fn read_payload(mem_address: u16, count: u8) -> ExtData {
        let mut payload = ExtData::zeroed();
        payload.set_mem_address(mem_address);
        payload.set(5, count);
        payload.with_checksum(0x2f, 0x00)
    }
}

impl fmt::Display for LinkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x} {}{}{} group {} {} data {:02x} {:02x} {:02x}",
            self.mem_address,
            if self.flags.in_use { "A" } else { "U" },
            if self.flags.controller { "C" } else { "R" },
            if self.flags.high_water_mark { "H" } else { "-" },
            self.group,
            self.target,
            self.data[0],
            self.data[1],
            self.data[2],
        )
    }
}
