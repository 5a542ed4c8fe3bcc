//! Message codes and marker bytes.
//!
//! Codes 0x50-0x58 are unsolicited frames from the modem. Codes 0x60 and
//! above are host commands; the modem echoes each one back followed by an
//! ACK or NAK byte.

/// Start-of-frame marker.
pub const START: u8 = 0x02;
/// Local acknowledgement byte.
pub const ACK: u8 = 0x06;
/// Local negative acknowledgement byte.
pub const NAK: u8 = 0x15;

pub const STANDARD_RECEIVED: u8 = 0x50;
pub const EXTENDED_RECEIVED: u8 = 0x51;
pub const X10_RECEIVED: u8 = 0x52;
pub const ALL_LINK_COMPLETE: u8 = 0x53;
pub const BUTTON_EVENT: u8 = 0x54;
pub const USER_RESET: u8 = 0x55;
pub const ALL_LINK_FAILURE: u8 = 0x56;
pub const ALL_LINK_RECORD: u8 = 0x57;
pub const ALL_LINK_CLEANUP_STATUS: u8 = 0x58;

pub const GET_INFO: u8 = 0x60;
pub const SEND_ALL_LINK: u8 = 0x61;
pub const SEND_STANDARD: u8 = 0x62;
pub const X10_SEND: u8 = 0x63;
pub const START_ALL_LINK: u8 = 0x64;
pub const CANCEL_ALL_LINK: u8 = 0x65;
pub const RESET: u8 = 0x67;
pub const GET_FIRST_ALL_LINK: u8 = 0x69;
pub const GET_NEXT_ALL_LINK: u8 = 0x6A;
pub const SET_CONFIG: u8 = 0x6B;
pub const MANAGE_ALL_LINK: u8 = 0x6F;
pub const GET_CONFIG: u8 = 0x73;

/// Length of the extended payload block.
pub const EXT_DATA_LEN: usize = 14;

/// Returns a human-readable name for a message code.
pub fn code_name(code: u8) -> &'static str {
    match code {
        STANDARD_RECEIVED => "standard_received",
        EXTENDED_RECEIVED => "extended_received",
        X10_RECEIVED => "x10_received",
        ALL_LINK_COMPLETE => "all_link_complete",
        BUTTON_EVENT => "button_event",
        USER_RESET => "user_reset",
        ALL_LINK_FAILURE => "all_link_failure",
        ALL_LINK_RECORD => "all_link_record",
        ALL_LINK_CLEANUP_STATUS => "all_link_cleanup_status",
        GET_INFO => "get_info",
        SEND_ALL_LINK => "send_all_link",
        SEND_STANDARD => "send_standard",
        X10_SEND => "x10_send",
        START_ALL_LINK => "start_all_link",
        CANCEL_ALL_LINK => "cancel_all_link",
        RESET => "reset",
        GET_FIRST_ALL_LINK => "get_first_all_link",
        GET_NEXT_ALL_LINK => "get_next_all_link",
        SET_CONFIG => "set_config",
        MANAGE_ALL_LINK => "manage_all_link",
        GET_CONFIG => "get_config",
        _ => "unknown",
    }
}

/// Fixed total frame length for a code (start marker included).
///
/// Returns `None` for unknown codes. For codes whose length depends on the
/// extended bit this is the standard (non-extended) length.
pub(crate) fn base_len(code: u8) -> Option<usize> {
    let len = match code {
        STANDARD_RECEIVED => 11,
        EXTENDED_RECEIVED => 11 + EXT_DATA_LEN,
        X10_RECEIVED => 4,
        ALL_LINK_COMPLETE => 10,
        BUTTON_EVENT => 3,
        USER_RESET => 2,
        ALL_LINK_FAILURE => 7,
        ALL_LINK_RECORD => 10,
        ALL_LINK_CLEANUP_STATUS => 3,
        GET_INFO => 9,
        SEND_ALL_LINK => 6,
        SEND_STANDARD => 9,
        X10_SEND => 5,
        START_ALL_LINK => 5,
        CANCEL_ALL_LINK | RESET | GET_FIRST_ALL_LINK | GET_NEXT_ALL_LINK => 3,
        SET_CONFIG => 4,
        MANAGE_ALL_LINK => 12,
        GET_CONFIG => 6,
        _ => return None,
    };
    Some(len)
}

/// Offset of the message-flags byte for codes with an extended variant.
pub(crate) fn flags_offset(code: u8) -> Option<usize> {
    match code {
        STANDARD_RECEIVED => Some(8),
        SEND_STANDARD => Some(5),
        _ => None,
    }
}
