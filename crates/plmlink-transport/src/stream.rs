use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default depth of the inbound byte-chunk channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

const READ_CHUNK_SIZE: usize = 1024;

/// [`Transport`] over any async byte stream writer.
///
/// Writes are serialized by an internal lock so two frames can never
/// interleave on the wire.
pub struct StreamTransport<W> {
    writer: Mutex<W>,
}

impl<W> StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the transport and return the inner writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, bytes: Bytes) -> Result<()> {
        let mut writer = self.writer.lock().await;
        trace!(len = bytes.len(), "writing frame");
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl<W> std::fmt::Debug for StreamTransport<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("writer", &std::any::type_name::<W>())
            .finish()
    }
}

/// Inbound half of a modem link: chunks of bytes in arrival order.
///
/// Chunk boundaries carry no meaning. A background task pumps the reader
/// until EOF or error, after which [`InboundBytes::recv`] returns `None`.
pub struct InboundBytes {
    rx: mpsc::Receiver<Bytes>,
    pump: Option<JoinHandle<()>>,
}

impl InboundBytes {
    /// Spawn a pump task reading from `reader`.
    pub fn spawn<R>(reader: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump(reader, tx));
        Self {
            rx,
            pump: Some(pump),
        }
    }

    /// Build from an existing channel (no pump task).
    ///
    /// Useful when bytes come from somewhere other than an `AsyncRead`,
    /// such as a test harness or a custom serial driver.
    pub fn from_channel(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx, pump: None }
    }

    /// Receive the next chunk. Returns `None` once the link is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Deliver every chunk to `callback` from a background task.
    pub fn on_bytes<F>(mut self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(chunk) = self.rx.recv().await {
                callback(chunk);
            }
        })
    }
}

impl Drop for InboundBytes {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for InboundBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundBytes")
            .field("pumped", &self.pump.is_some())
            .finish()
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<Bytes>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("modem link reached EOF");
                return;
            }
            Ok(n) => {
                trace!(len = n, "read bytes");
                if tx.send(buf.split().freeze()).await.is_err() {
                    debug!("inbound receiver dropped, stopping pump");
                    return;
                }
            }
            Err(err) => {
                warn!(error = %TransportError::Io(err), "modem link read failed");
                return;
            }
        }
    }
}

/// Split a bidirectional stream into a [`StreamTransport`] and an
/// [`InboundBytes`] pump.
pub fn split<S>(stream: S, capacity: usize) -> (StreamTransport<WriteHalf<S>>, InboundBytes)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
    (
        StreamTransport::new(write_half),
        InboundBytes::spawn(read_half, capacity),
    )
}
