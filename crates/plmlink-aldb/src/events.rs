use plmlink_frame::Address;
use serde::Serialize;

use crate::record::LinkRecord;

/// What a successful write did to a device's links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkChangeKind {
    ControllerCreated,
    ControllerRemoved,
    ResponderCreated,
    ResponderRemoved,
}

impl LinkChangeKind {
    /// Classify a written record by its direction and in-use bit.
    pub fn of(record: &LinkRecord) -> Self {
        match (record.is_controller(), record.is_in_use()) {
            (true, true) => LinkChangeKind::ControllerCreated,
            (true, false) => LinkChangeKind::ControllerRemoved,
            (false, true) => LinkChangeKind::ResponderCreated,
            (false, false) => LinkChangeKind::ResponderRemoved,
        }
    }
}

/// Announced after a staged change is written to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkChange {
    /// Device whose database changed.
    pub device: Address,
    pub kind: LinkChangeKind,
    /// The record as written.
    pub record: LinkRecord,
}

impl LinkChange {
    pub fn new(device: Address, record: LinkRecord) -> Self {
        Self {
            device,
            kind: LinkChangeKind::of(&record),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_direction_and_use() {
        let target = Address::new(1, 2, 3);
        let mut record = LinkRecord::new(true, 1, target, [0; 3]);
        assert_eq!(
            LinkChangeKind::of(&record),
            LinkChangeKind::ControllerCreated
        );
        record.flags.in_use = false;
        assert_eq!(
            LinkChangeKind::of(&record),
            LinkChangeKind::ControllerRemoved
        );

        let mut record = LinkRecord::new(false, 1, target, [0; 3]);
        assert_eq!(
            LinkChangeKind::of(&record),
            LinkChangeKind::ResponderCreated
        );
        record.flags.in_use = false;
        assert_eq!(
            LinkChange::new(target, record).kind,
            LinkChangeKind::ResponderRemoved
        );
    }
}
