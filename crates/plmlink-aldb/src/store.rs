use std::collections::BTreeMap;
use std::fmt;

use plmlink_frame::Address;
use serde::Serialize;

use crate::error::{AldbError, Result};
use crate::record::{LinkRecord, RECORD_SIZE};

/// How much of a table the mirror holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Empty,
    Loading,
    Partial,
    Loaded,
    Failed,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStatus::Empty => "empty",
            LoadStatus::Loading => "loading",
            LoadStatus::Partial => "partial",
            LoadStatus::Loaded => "loaded",
            LoadStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Key of a staged change.
///
/// Changes to existing records are keyed by their address. New records have
/// no address until written and get a placeholder id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKey {
    Existing(u16),
    New(u32),
}

/// Status a record set implies.
///
/// `Loaded` iff the records form an unbroken chain, 8 bytes apart, from
/// `first_address` down to a high-water-mark record. `Empty` without
/// records, `Partial` otherwise.
pub fn derive_status(first_address: u16, records: &BTreeMap<u16, LinkRecord>) -> LoadStatus {
    if records.is_empty() {
        return LoadStatus::Empty;
    }
    match walk_chain(first_address, records) {
        Chain::Complete => LoadStatus::Loaded,
        Chain::Gap(_) | Chain::Exhausted => LoadStatus::Partial,
    }
}

enum Chain {
    /// Reached a high-water-mark record.
    Complete,
    /// First address missing from the chain.
    Gap(u16),
    /// Ran out of address space without a high-water mark.
    Exhausted,
}

fn walk_chain(first_address: u16, records: &BTreeMap<u16, LinkRecord>) -> Chain {
    let mut mem = first_address;
    loop {
        match records.get(&mem) {
            None => return Chain::Gap(mem),
            Some(record) if record.is_high_water_mark() => return Chain::Complete,
            Some(_) => match mem.checked_sub(RECORD_SIZE) {
                Some(next) => mem = next,
                None => return Chain::Exhausted,
            },
        }
    }
}

/// Local mirror of one device's link database.
///
/// `add`, `modify` and `remove` only stage changes; the table itself changes
/// when the sync engine loads records or a staged write succeeds.
#[derive(Debug, Clone)]
pub struct Aldb {
    first_address: u16,
    records: BTreeMap<u16, LinkRecord>,
    status: LoadStatus,
    pending: BTreeMap<PendingKey, LinkRecord>,
    next_placeholder: u32,
}

impl Aldb {
    pub fn new(first_address: u16) -> Self {
        Self {
            first_address,
            records: BTreeMap::new(),
            status: LoadStatus::Empty,
            pending: BTreeMap::new(),
            next_placeholder: 0,
        }
    }

    pub fn first_address(&self) -> u16 {
        self.first_address
    }

    /// Number of in-use records.
    pub fn len(&self) -> usize {
        self.records.values().filter(|r| r.is_in_use()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn get(&self, mem_address: u16) -> Option<&LinkRecord> {
        self.records.get(&mem_address)
    }

    /// Every known record, highest address first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LinkRecord> + '_ {
        self.records.values().rev()
    }

    /// In-use record linking `target` on `group` in the given direction.
    pub fn find(&self, group: u8, target: Address, controller: bool) -> Option<&LinkRecord> {
        self.iter().find(|r| {
            r.is_in_use()
                && r.group == group
                && r.target == target
                && r.is_controller() == controller
        })
    }

    /// Address of the high-water-mark record, if known.
    pub fn high_water_mark(&self) -> Option<u16> {
        self.iter()
            .find(|r| r.is_high_water_mark())
            .map(|r| r.mem_address)
    }

    /// Slot the next new record is written to.
    ///
    /// The high-water mark when known; otherwise just below the lowest
    /// known record, or the first address for an empty table.
    pub fn next_free_slot(&self) -> u16 {
        if let Some(hwm) = self.high_water_mark() {
            return hwm;
        }
        match self.records.keys().next() {
            Some(lowest) => lowest.saturating_sub(RECORD_SIZE),
            None => self.first_address,
        }
    }

    /// Stage a new link.
    pub fn add(
        &mut self,
        controller: bool,
        group: u8,
        target: Address,
        data: [u8; 3],
    ) -> PendingKey {
        self.next_placeholder += 1;
        let key = PendingKey::New(self.next_placeholder);
        self.pending
            .insert(key, LinkRecord::new(controller, group, target, data));
        key
    }

    /// Stage new contents for an existing record.
    ///
    /// The record's address and high-water-mark flag are kept.
    pub fn modify(&mut self, record: LinkRecord) -> Result<PendingKey> {
        let existing = self
            .records
            .get(&record.mem_address)
            .ok_or(AldbError::UnknownRecord(record.mem_address))?;
        let mut staged = record;
        staged.flags.high_water_mark = existing.flags.high_water_mark;
        let key = PendingKey::Existing(record.mem_address);
        self.pending.insert(key, staged);
        Ok(key)
    }

    /// Stage marking an existing record unused.
    pub fn remove(&mut self, mem_address: u16) -> Result<PendingKey> {
        let mut staged = *self
            .records
            .get(&mem_address)
            .ok_or(AldbError::UnknownRecord(mem_address))?;
        staged.flags.in_use = false;
        let key = PendingKey::Existing(mem_address);
        self.pending.insert(key, staged);
        Ok(key)
    }

    /// Staged changes in write order: existing records first.
    pub fn pending(&self) -> &BTreeMap<PendingKey, LinkRecord> {
        &self.pending
    }

    /// Drop every staged change.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Forget the loaded table. Staged changes are kept.
    pub fn clear(&mut self) {
        self.records.clear();
        self.status = LoadStatus::Empty;
    }

    /// Record read from the device.
    pub(crate) fn insert(&mut self, record: LinkRecord) {
        self.records.insert(record.mem_address, record);
    }

    pub(crate) fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }

    /// Status implied by the records held.
    pub fn derived_status(&self) -> LoadStatus {
        derive_status(self.first_address, &self.records)
    }

    /// Highest address missing from the chain below the first address.
    pub(crate) fn first_gap(&self) -> Option<u16> {
        match walk_chain(self.first_address, &self.records) {
            Chain::Gap(mem) => Some(mem),
            Chain::Complete | Chain::Exhausted => None,
        }
    }

    /// Apply a successful write of a staged change.
    ///
    /// Writing at the high-water mark moves the mark down one slot.
    pub(crate) fn commit(&mut self, key: PendingKey, written: LinkRecord) {
        self.pending.remove(&key);
        let replaced_mark = self
            .records
            .get(&written.mem_address)
            .is_some_and(|r| r.is_high_water_mark());
        self.records.insert(written.mem_address, written);

        if matches!(key, PendingKey::New(_)) && replaced_mark && !written.is_high_water_mark() {
            if let Some(next) = written.mem_address.checked_sub(RECORD_SIZE) {
                self.records
                    .entry(next)
                    .or_insert_with(|| LinkRecord::high_water_mark(next));
            }
        }
    }

    /// Read-only, serializable view.
    pub fn snapshot(&self) -> AldbSnapshot {
        AldbSnapshot {
            first_address: self.first_address,
            status: self.status,
            high_water_mark: self.high_water_mark(),
            records: self.iter().copied().collect(),
            pending: self.pending.len(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl<'a> IntoIterator for &'a Aldb {
    type Item = &'a LinkRecord;
    type IntoIter = std::iter::Rev<std::collections::btree_map::Values<'a, u16, LinkRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values().rev()
    }
}

/// Point-in-time copy of a link database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AldbSnapshot {
    pub first_address: u16,
    pub status: LoadStatus,
    pub high_water_mark: Option<u16>,
    pub records: Vec<LinkRecord>,
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Address {
        Address::new(0x44, 0x85, 0x11)
    }

    fn link(mem: u16, controller: bool, group: u8) -> LinkRecord {
        LinkRecord {
            mem_address: mem,
            ..LinkRecord::new(controller, group, target(), [0; 3])
        }
    }

    fn loaded() -> Aldb {
        let mut aldb = Aldb::new(0x0fff);
        aldb.insert(link(0x0fff, true, 1));
        aldb.insert(link(0x0ff7, false, 1));
        aldb.insert(LinkRecord::high_water_mark(0x0fef));
        aldb.set_status(aldb.derived_status());
        aldb
    }

    #[test]
    fn status_derivation() {
        let aldb = loaded();
        assert_eq!(aldb.status(), LoadStatus::Loaded);

        let mut records = aldb.records.clone();
        records.remove(&0x0ff7);
        assert_eq!(derive_status(0x0fff, &records), LoadStatus::Partial);

        assert_eq!(derive_status(0x0fff, &BTreeMap::new()), LoadStatus::Empty);

        let mut no_mark = aldb.records.clone();
        no_mark.remove(&0x0fef);
        assert_eq!(derive_status(0x0fff, &no_mark), LoadStatus::Partial);
    }

    #[test]
    fn first_gap_finds_highest_missing() {
        let mut aldb = loaded();
        aldb.records.remove(&0x0ff7);
        assert_eq!(aldb.first_gap(), Some(0x0ff7));
        assert_eq!(loaded().first_gap(), None);
    }

    #[test]
    fn len_counts_in_use_only() {
        let aldb = loaded();
        assert_eq!(aldb.len(), 2);
        assert_eq!(aldb.high_water_mark(), Some(0x0fef));
        let addrs: Vec<u16> = aldb.iter().map(|r| r.mem_address).collect();
        assert_eq!(addrs, vec![0x0fff, 0x0ff7, 0x0fef]);
    }

    #[test]
    fn find_by_group_target_direction() {
        let aldb = loaded();
        assert_eq!(
            aldb.find(1, target(), true).map(|r| r.mem_address),
            Some(0x0fff)
        );
        assert_eq!(
            aldb.find(1, target(), false).map(|r| r.mem_address),
            Some(0x0ff7)
        );
        assert!(aldb.find(2, target(), true).is_none());
    }

    #[test]
    fn staging_never_touches_table() {
        let mut aldb = loaded();
        let before = aldb.snapshot().records;

        aldb.add(true, 5, target(), [0; 3]);
        aldb.remove(0x0ff7).unwrap();
        let mut changed = *aldb.get(0x0fff).unwrap();
        changed.group = 9;
        aldb.modify(changed).unwrap();

        assert_eq!(aldb.snapshot().records, before);
        assert_eq!(aldb.pending().len(), 3);
        let keys: Vec<PendingKey> = aldb.pending().keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                PendingKey::Existing(0x0ff7),
                PendingKey::Existing(0x0fff),
                PendingKey::New(1)
            ]
        );
    }

    #[test]
    fn staging_unknown_address_is_error() {
        let mut aldb = loaded();
        assert!(matches!(
            aldb.remove(0x0100),
            Err(AldbError::UnknownRecord(0x0100))
        ));
        assert!(matches!(
            aldb.modify(link(0x0100, true, 1)),
            Err(AldbError::UnknownRecord(0x0100))
        ));
    }

    #[test]
    fn commit_new_record_advances_mark() {
        let mut aldb = loaded();
        let key = aldb.add(true, 5, target(), [0; 3]);
        let slot = aldb.next_free_slot();
        assert_eq!(slot, 0x0fef);

        let mut written = aldb.pending()[&key];
        written.mem_address = slot;
        aldb.commit(key, written);

        assert_eq!(aldb.high_water_mark(), Some(0x0fe7));
        assert_eq!(aldb.len(), 3);
        assert!(aldb.pending().is_empty());
        assert_eq!(aldb.derived_status(), LoadStatus::Loaded);
    }

    #[test]
    fn commit_into_unread_table_keeps_mark_unknown() {
        let mut aldb = Aldb::new(0x0fff);
        let key = aldb.add(true, 5, target(), [0; 3]);
        let slot = aldb.next_free_slot();
        assert_eq!(slot, 0x0fff);

        let mut written = aldb.pending()[&key];
        written.mem_address = slot;
        aldb.commit(key, written);

        assert_eq!(aldb.high_water_mark(), None);
        assert_eq!(aldb.len(), 1);
        assert_eq!(aldb.derived_status(), LoadStatus::Partial);
    }

    #[test]
    fn next_free_slot_without_mark() {
        let mut aldb = Aldb::new(0x0fff);
        assert_eq!(aldb.next_free_slot(), 0x0fff);
        aldb.insert(link(0x0fff, true, 1));
        assert_eq!(aldb.next_free_slot(), 0x0ff7);
    }

    #[test]
    fn snapshot_serializes() {
        let json = loaded().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "loaded");
        assert_eq!(value["records"].as_array().unwrap().len(), 3);
        assert_eq!(value["records"][0]["target"], "44.85.11");
    }
}
