/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer does not begin with the `0x02` start marker.
    #[error("invalid start byte 0x{0:02x} (expected 0x02)")]
    InvalidStart(u8),

    /// The message code following the start marker is not a known frame.
    #[error("unknown message code 0x{0:02x}")]
    UnknownType(u8),

    /// A device address could not be parsed.
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for soft decode failures a reader recovers from by discarding
    /// input and resynchronizing on the next start marker.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidStart(_) | FrameError::UnknownType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
