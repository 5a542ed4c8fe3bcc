use std::borrow::Cow;

/// Maps `(cmd1, cmd2)` to the command names used in topics, and back.
///
/// Device-type layers supply richer catalogs; the modem only needs names
/// stable enough to build correlation keys.
pub trait CommandCatalog: Send + Sync {
    /// Name for a command, or `None` if the catalog does not know it.
    fn name(&self, cmd1: u8, cmd2: u8) -> Option<&'static str>;

    /// Command bytes for a name. `cmd2` is `None` when any value is valid.
    fn lookup(&self, name: &str) -> Option<(u8, Option<u8>)>;

    /// Name for a command, falling back to `cmd_xx`.
    fn name_or_code(&self, cmd1: u8, cmd2: u8) -> Cow<'static, str> {
        match self.name(cmd1, cmd2) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("cmd_{cmd1:02x}")),
        }
    }
}

const BASIC_COMMANDS: &[(u8, &str)] = &[
    (0x01, "assign_to_all_link_group"),
    (0x02, "delete_from_all_link_group"),
    (0x06, "all_link_cleanup_report"),
    (0x09, "enter_linking_mode"),
    (0x0A, "enter_unlinking_mode"),
    (0x0D, "engine_version"),
    (0x0F, "ping"),
    (0x10, "id_request"),
    (0x11, "on"),
    (0x12, "on_fast"),
    (0x13, "off"),
    (0x14, "off_fast"),
    (0x19, "status_request"),
    (0x2E, "extended_get_set"),
    (0x2F, "read_write_aldb"),
];

/// Names the commands the driver itself issues or listens for.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCatalog;

impl CommandCatalog for BasicCatalog {
    fn name(&self, cmd1: u8, _cmd2: u8) -> Option<&'static str> {
        BASIC_COMMANDS
            .iter()
            .find(|(code, _)| *code == cmd1)
            .map(|(_, name)| *name)
    }

    fn lookup(&self, name: &str) -> Option<(u8, Option<u8>)> {
        if let Some(code) = name
            .strip_prefix("cmd_")
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            return Some((code, None));
        }
        BASIC_COMMANDS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| (*code, None))
    }
}
