//! TCP transport for network-attached modems.
//!
//! Hubs expose the modem's serial protocol verbatim on a TCP port
//! (conventionally 9761).

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::{InboundBytes, StreamTransport, DEFAULT_INBOUND_CAPACITY};

/// Conventional TCP port for hub-attached modems.
pub const DEFAULT_HUB_PORT: u16 = 9761;

/// Connect to a hub and return the transport halves.
pub async fn connect<A>(addr: A) -> Result<(StreamTransport<OwnedWriteHalf>, InboundBytes)>
where
    A: ToSocketAddrs + std::fmt::Debug,
{
    let label = format!("{addr:?}");
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: label.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    debug!(addr = %label, "connected to modem hub");

    let (read_half, write_half) = stream.into_split();
    Ok((
        StreamTransport::new(write_half),
        InboundBytes::spawn(read_half, DEFAULT_INBOUND_CAPACITY),
    ))
}
