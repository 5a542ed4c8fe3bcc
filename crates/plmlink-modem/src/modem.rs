use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use plmlink_frame::{Ack, Frame, FrameReader, ModemInfo, MsgType, Request, StandardTemplate};
use plmlink_transport::{InboundBytes, Transport};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::catalog::{BasicCatalog, CommandCatalog};
use crate::config::ModemConfig;
use crate::dedup::Deduplicator;
use crate::dispatch::{Dispatcher, Subscription, Waiter};
use crate::error::{ModemError, Result};
use crate::guard::KeyedLocks;
use crate::handler::{
    AwaitsDeviceAck, AwaitsLocalAck, DeduplicatesBroadcast, DirectCommand, ModemCommand,
};
use crate::outcome::ResultCode;
use crate::topic::Topic;

type SendFuture<'a> = Pin<Box<dyn Future<Output = plmlink_transport::Result<()>> + Send + 'a>>;

trait ErasedTransport: Send + Sync {
    fn send_bytes(&self, bytes: Bytes) -> SendFuture<'_>;
}

impl<T: Transport> ErasedTransport for T {
    fn send_bytes(&self, bytes: Bytes) -> SendFuture<'_> {
        Box::pin(self.send(bytes))
    }
}

/// Everything observed while resolving one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub code: ResultCode,
    /// The modem's echo (or reply, for requests that return data).
    pub echo: Option<Frame>,
    /// The device's direct ACK/NAK.
    pub reply: Option<Frame>,
}

impl Exchange {
    fn unsent() -> Self {
        Self {
            code: ResultCode::Unsent,
            echo: None,
            reply: None,
        }
    }
}

struct Inner {
    transport: Box<dyn ErasedTransport>,
    config: ModemConfig,
    catalog: Arc<dyn CommandCatalog>,
    dispatcher: Arc<Dispatcher>,
    keys: KeyedLocks,
    wire: AsyncMutex<()>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.dispatcher.close();
    }
}

/// Driver for one PowerLinc modem.
///
/// Cheap to clone; clones share the link, the dispatcher and the guards.
#[derive(Clone)]
pub struct Modem {
    inner: Arc<Inner>,
}

impl Modem {
    /// Start the driver with the built-in command catalog.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: Transport>(transport: T, inbound: InboundBytes, config: ModemConfig) -> Self {
        Self::start_with_catalog(transport, inbound, config, Arc::new(BasicCatalog))
    }

    /// Start the driver with a caller-supplied command catalog.
    pub fn start_with_catalog<T: Transport>(
        transport: T,
        inbound: InboundBytes,
        config: ModemConfig,
        catalog: Arc<dyn CommandCatalog>,
    ) -> Self {
        let dispatcher = Dispatcher::new(config.channel_depth);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            inbound,
            Arc::clone(&dispatcher),
            Arc::clone(&catalog),
            cancel.clone(),
        ));
        debug!(?config, "modem driver started");

        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                config,
                catalog,
                dispatcher,
                keys: KeyedLocks::new(),
                wire: AsyncMutex::new(()),
                cancel,
                reader: Mutex::new(Some(reader)),
            }),
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &dyn CommandCatalog {
        self.inner.catalog.as_ref()
    }

    /// Send a direct command and wait for the device to answer.
    pub async fn send_direct(&self, cmd: &DirectCommand) -> ResultCode {
        self.send_confirmed(cmd).await
    }

    /// Send a modem-local command and wait for its echo.
    pub async fn send_modem(&self, cmd: &ModemCommand) -> ResultCode {
        self.send(cmd).await
    }

    /// Send any command resolved by the modem's local ACK.
    pub async fn send<C: AwaitsLocalAck + ?Sized>(&self, cmd: &C) -> ResultCode {
        self.exchange(cmd).await.code
    }

    /// Send any command resolved by the addressed device.
    pub async fn send_confirmed<C: AwaitsDeviceAck + ?Sized>(&self, cmd: &C) -> ResultCode {
        self.exchange_confirmed(cmd).await.code
    }

    /// Like [`Modem::send`], keeping the echo frame.
    pub async fn exchange<C: AwaitsLocalAck + ?Sized>(&self, cmd: &C) -> Exchange {
        let catalog = self.catalog();
        self.run(
            cmd.request(),
            cmd.topic(catalog),
            cmd.local_ack_topics(catalog),
            None,
        )
        .await
    }

    /// Like [`Modem::send_confirmed`], keeping the echo and reply frames.
    pub async fn exchange_confirmed<C: AwaitsDeviceAck + ?Sized>(&self, cmd: &C) -> Exchange {
        let catalog = self.catalog();
        self.run(
            cmd.request(),
            cmd.topic(catalog),
            cmd.local_ack_topics(catalog),
            Some((cmd.device_ack_topics(catalog), cmd.reply_template())),
        )
        .await
    }

    async fn run(
        &self,
        request: Request,
        key: Topic,
        ack_topics: [Topic; 2],
        device: Option<([Topic; 2], Option<StandardTemplate>)>,
    ) -> Exchange {
        let inner = &self.inner;
        let _guard = inner.keys.acquire(key.as_str()).await;

        let mut local = match inner.dispatcher.waiter(&ack_topics, None) {
            Ok(waiter) => waiter,
            Err(err) => {
                warn!(%key, %err, "cannot wait for local ack");
                return Exchange::unsent();
            }
        };
        let mut confirm = match device {
            Some((topics, template)) => match inner.dispatcher.waiter(&topics, template) {
                Ok(waiter) => Some(waiter),
                Err(err) => {
                    warn!(%key, %err, "cannot wait for device ack");
                    return Exchange::unsent();
                }
            },
            None => None,
        };

        let echo = {
            let _wire = inner.wire.lock().await;
            if inner.cancel.is_cancelled() {
                return Exchange::unsent();
            }
            trace!(%key, code = request.code(), "sending command");
            if let Err(err) = inner.transport.send_bytes(request.to_bytes()).await {
                warn!(%key, error = %err, "command write failed");
                return Exchange::unsent();
            }
            match local.recv(inner.config.ack_timeout).await {
                Ok(frame) => frame,
                Err(err) => {
                    debug!(%key, %err, "no local ack");
                    return Exchange::unsent();
                }
            }
        };

        if local_ack(&echo) == Ack::Nak {
            debug!(%key, "modem rejected command");
            return Exchange {
                code: ResultCode::Failure,
                echo: Some(echo),
                reply: None,
            };
        }

        let Some(confirm) = confirm.as_mut() else {
            return Exchange {
                code: ResultCode::Success,
                echo: Some(echo),
                reply: None,
            };
        };

        match confirm.recv(inner.config.direct_ack_timeout).await {
            Ok(reply) => {
                let code = match reply {
                    Frame::Standard(msg) if msg.flags.msg_type == MsgType::DirectNak => {
                        debug!(%key, cmd2 = msg.cmd2, "device rejected command");
                        ResultCode::Unclear
                    }
                    _ => ResultCode::Success,
                };
                Exchange {
                    code,
                    echo: Some(echo),
                    reply: Some(reply),
                }
            }
            Err(err) => {
                debug!(%key, %err, "device did not answer");
                Exchange {
                    code: ResultCode::DeviceUnresponsive,
                    echo: Some(echo),
                    reply: None,
                }
            }
        }
    }

    /// Query the modem's address, category and firmware (`0x60`).
    pub async fn get_info(&self) -> Result<ModemInfo> {
        let exchange = self.exchange(&ModemCommand::get_info()).await;
        match exchange.echo {
            Some(Frame::ModemInfo(info)) if exchange.code.is_success() => Ok(info),
            _ => Err(ModemError::Rejected(exchange.code)),
        }
    }

    /// Query the modem's configuration flags (`0x73`).
    pub async fn get_config(&self) -> Result<plmlink_frame::ModemConfig> {
        let exchange = self.exchange(&ModemCommand::get_config()).await;
        match exchange.echo {
            Some(Frame::ModemConfig(cfg)) if exchange.code.is_success() => Ok(cfg),
            _ => Err(ModemError::Rejected(exchange.code)),
        }
    }

    /// Claim the next frames on `topic`, optionally filtered by `template`.
    ///
    /// Register before sending the request that provokes the frames.
    pub fn waiter(&self, topic: Topic, template: Option<StandardTemplate>) -> Result<Waiter> {
        self.inner.dispatcher.waiter(&[topic], template)
    }

    /// Stream every frame on `topic` that no waiter claims.
    pub fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        self.inner.dispatcher.subscribe(topic, None)
    }

    /// Stream a listener's frames with repeated copies suppressed.
    pub fn listen<L: DeduplicatesBroadcast + ?Sized>(&self, listener: &L) -> Result<Subscription> {
        let topic = listener.broadcast_topic(self.catalog());
        let dedup = Deduplicator::new(self.inner.config.dedup_interval);
        self.inner.dispatcher.subscribe(topic, Some(dedup))
    }

    /// Channel of frames nobody claimed. Replaces any previous channel.
    pub fn unhandled(&self) -> mpsc::Receiver<Frame> {
        self.inner.dispatcher.unhandled()
    }

    /// True until [`Modem::shutdown`] is called or the link closes.
    pub fn is_running(&self) -> bool {
        let reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        !self.inner.cancel.is_cancelled()
            && reader.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the reader task and release every waiter and subscription.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.dispatcher.close();
        let handle = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(%err, "modem reader task failed");
            }
        }
        debug!("modem driver stopped");
    }
}

impl std::fmt::Debug for Modem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem")
            .field("config", &self.inner.config)
            .field("running", &!self.inner.cancel.is_cancelled())
            .finish()
    }
}

fn local_ack(frame: &Frame) -> Ack {
    match frame {
        Frame::Echo { ack, .. } => *ack,
        Frame::ModemInfo(info) => info.ack,
        Frame::ModemConfig(cfg) => cfg.ack,
        _ => Ack::Ack,
    }
}

async fn read_loop(
    mut inbound: InboundBytes,
    dispatcher: Arc<Dispatcher>,
    catalog: Arc<dyn CommandCatalog>,
    cancel: CancellationToken,
) {
    let mut reader = FrameReader::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("modem reader cancelled");
                break;
            }
            chunk = inbound.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!("modem link closed");
            break;
        };

        reader.push(&chunk);
        while let Some(frame) = reader.next_frame() {
            let topic = Topic::for_frame(&frame, catalog.as_ref());
            let delivery = dispatcher.dispatch(&topic, frame);
            trace!(%topic, ?delivery, "dispatched frame");
        }
    }
    dispatcher.close();
}
