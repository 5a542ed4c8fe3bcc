/// Errors that can occur in link-database operations.
#[derive(Debug, thiserror::Error)]
pub enum AldbError {
    /// A write was requested before the table was fully loaded.
    #[error("link database is not loaded; load it first or force the write")]
    WriteWithoutLoad,

    /// A change was staged for an address that is not in the table.
    #[error("no link record at 0x{0:04x}")]
    UnknownRecord(u16),

    /// Correlation engine error.
    #[error("modem error: {0}")]
    Modem(#[from] plmlink_modem::ModemError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AldbError>;
