use std::fmt;

use crate::address::Address;
use crate::code::EXT_DATA_LEN;

/// The 14-byte payload of an extended message.
///
/// Slots are numbered D1..D14 as in the protocol documentation. Command
/// semantics assign meaning to each slot; the accessors below cover the
/// slots used by the link-database read/write command (`0x2F`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtData([u8; EXT_DATA_LEN]);

impl ExtData {
    /// All-zero payload.
    pub const fn zeroed() -> Self {
        Self([0; EXT_DATA_LEN])
    }

    /// Wrap raw payload bytes.
    pub const fn from_bytes(bytes: [u8; EXT_DATA_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut data = [0u8; EXT_DATA_LEN];
        data.copy_from_slice(&bytes[..EXT_DATA_LEN]);
        Self(data)
    }

    /// Raw payload bytes.
    pub const fn bytes(&self) -> &[u8; EXT_DATA_LEN] {
        &self.0
    }

    /// Read slot `Dn` (1-based). Out-of-range slots read as zero.
    pub fn get(&self, slot: usize) -> u8 {
        match slot {
            1..=EXT_DATA_LEN => self.0[slot - 1],
            _ => 0,
        }
    }

    /// Write slot `Dn` (1-based). Out-of-range slots are ignored.
    pub fn set(&mut self, slot: usize, value: u8) {
        if (1..=EXT_DATA_LEN).contains(&slot) {
            self.0[slot - 1] = value;
        }
    }

    /// Builder form of [`ExtData::set`].
    pub fn with(mut self, slot: usize, value: u8) -> Self {
        self.set(slot, value);
        self
    }

    /// Link-database memory address (D3 high, D4 low).
    pub fn mem_address(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    pub fn set_mem_address(&mut self, mem: u16) {
        let [high, low] = mem.to_be_bytes();
        self.0[2] = high;
        self.0[3] = low;
    }

    /// Record count for reads, byte count for writes (D5).
    pub fn record_count(&self) -> u8 {
        self.0[4]
    }

    /// Record control-flags byte (D6).
    pub fn control_flags(&self) -> u8 {
        self.0[5]
    }

    /// Record group (D7).
    pub fn group(&self) -> u8 {
        self.0[6]
    }

    /// Record target address (D8-D10).
    pub fn target(&self) -> Address {
        Address::from_slice(&self.0[7..10])
    }

    /// Record data bytes (D11-D13).
    pub fn record_data(&self) -> [u8; 3] {
        [self.0[10], self.0[11], self.0[12]]
    }

    /// Place an 8-byte link record image (flags, group, address, data) in
    /// D6..D13.
    pub fn set_record(&mut self, flags: u8, group: u8, target: Address, data: [u8; 3]) {
        self.0[5] = flags;
        self.0[6] = group;
        self.0[7..10].copy_from_slice(&target.bytes());
        self.0[10..13].copy_from_slice(&data);
    }

    /// i2cs checksum: two's complement of cmd1 + cmd2 + D1..D13.
    pub fn checksum(&self, cmd1: u8, cmd2: u8) -> u8 {
        let sum = self.0[..EXT_DATA_LEN - 1]
            .iter()
            .fold(cmd1.wrapping_add(cmd2), |acc, b| acc.wrapping_add(*b));
        (!sum).wrapping_add(1)
    }

    /// Store the checksum for `cmd1`/`cmd2` in D14.
    pub fn with_checksum(mut self, cmd1: u8, cmd2: u8) -> Self {
        self.0[EXT_DATA_LEN - 1] = self.checksum(cmd1, cmd2);
        self
    }
}

impl fmt::Debug for ExtData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtData(")?;
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}
