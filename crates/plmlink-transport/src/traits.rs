use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// Outbound half of a modem link.
///
/// Implementations write one complete, already-encoded frame per call. The
/// link is shared by every device on the network, so a single `Transport`
/// is owned by the modem driver and all commands go through it.
pub trait Transport: Send + Sync + 'static {
    /// Write `bytes` to the link and flush.
    fn send(&self, bytes: Bytes) -> impl Future<Output = Result<()>> + Send;
}
