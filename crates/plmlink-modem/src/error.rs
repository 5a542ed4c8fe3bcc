use std::time::Duration;

use crate::outcome::ResultCode;

/// Errors that can occur in modem operations.
#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] plmlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] plmlink_frame::FrameError),

    /// Another waiter or subscriber already owns the topic.
    #[error("topic '{0}' already has a consumer")]
    TopicInUse(String),

    /// No matching frame arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A modem request did not complete.
    #[error("modem request failed: {0}")]
    Rejected(ResultCode),

    /// The modem was shut down.
    #[error("modem is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, ModemError>;
