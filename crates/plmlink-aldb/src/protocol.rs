//! Wire access to a link database.
//!
//! The sync engine only sees [`LinkDatabaseProtocol`]. Remote devices are
//! read and written with extended `0x2F` messages; the modem's own table
//! is walked with get-first/get-next and changed with manage-record
//! commands.

use std::future::Future;
use std::time::Duration;

use plmlink_frame::{Address, Frame, ManageRecord, MsgType, Outbound, StandardTemplate};
use plmlink_modem::{DirectCommand, Modem, ModemCommand, ModemError, ResultCode, Topic, Waiter};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Result;
use crate::record::{LinkRecord, RECORD_SIZE};

/// First (highest) record address of a remote device's table.
pub const DEVICE_FIRST_ADDRESS: u16 = 0x0fff;
/// First synthesized address of the modem's own table.
pub const MODEM_FIRST_ADDRESS: u16 = 0x3fff;

const ALDB_CMD: u8 = 0x2f;
const RESPONSE_SUBCMD: u8 = 0x01;

/// Reads and writes one link database.
///
/// Every read returns `Ok(None)` when no record arrived in time; the sync
/// engine owns the retry policy. `Err` is reserved for a modem that has
/// shut down.
pub trait LinkDatabaseProtocol: Send + Sync {
    /// Address of the table's first record.
    fn first_address(&self) -> u16;

    /// Device owning the table.
    fn device(&self) -> Address;

    /// Whether [`LinkDatabaseProtocol::read_at`] can ever succeed.
    fn supports_direct_reads(&self) -> bool {
        true
    }

    /// Start a sequential walk and return its first record.
    fn get_first(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<LinkRecord>>> + Send;

    /// Next record of the walk started by [`LinkDatabaseProtocol::get_first`].
    fn get_next(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<LinkRecord>>> + Send;

    /// Read the single record at `mem_address`.
    fn read_at(
        &self,
        mem_address: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<LinkRecord>>> + Send;

    /// Write one record to the table.
    fn write(&self, record: &LinkRecord) -> impl Future<Output = ResultCode> + Send;
}

/// Map a waiter error to the protocol contract: a timeout is no record.
fn timed_out<T>(err: ModemError) -> Result<Option<T>> {
    match err {
        ModemError::Timeout(_) => Ok(None),
        other => Err(other.into()),
    }
}

/// Link database of a remote device, over extended `0x2F` messages.
pub struct DeviceAldbProtocol {
    modem: Modem,
    address: Address,
    first_address: u16,
    responses: Mutex<Option<Waiter>>,
}

impl DeviceAldbProtocol {
    pub fn new(modem: Modem, address: Address) -> Self {
        Self::with_first_address(modem, address, DEVICE_FIRST_ADDRESS)
    }

    /// For devices whose table does not start at the usual address.
    pub fn with_first_address(modem: Modem, address: Address, first_address: u16) -> Self {
        Self {
            modem,
            address,
            first_address,
            responses: Mutex::new(None),
        }
    }

    /// Topic record responses arrive on.
    pub fn response_topic(&self) -> Topic {
        let name = self.modem.catalog().name_or_code(ALDB_CMD, 0x00);
        Topic::device(self.address, &name, MsgType::Direct, None)
    }

    fn response_template(&self) -> StandardTemplate {
        StandardTemplate::any()
            .from(self.address)
            .cmd1(ALDB_CMD)
            .data(2, RESPONSE_SUBCMD)
    }

    fn ensure_waiter<'a>(&self, slot: &'a mut Option<Waiter>) -> Result<&'a mut Waiter> {
        if slot.is_none() {
            let waiter = self
                .modem
                .waiter(self.response_topic(), Some(self.response_template()))?;
            *slot = Some(waiter);
        }
        match slot.as_mut() {
            Some(waiter) => Ok(waiter),
            None => Err(ModemError::Shutdown.into()),
        }
    }

    async fn request(&self, mem_address: u16, count: u8) -> ResultCode {
        let payload = LinkRecord::read_payload(mem_address, count);
        let cmd = DirectCommand::extended(self.address, ALDB_CMD, 0x00, payload);
        self.modem.send_direct(&cmd).await
    }

    /// Next record response, optionally only the one at `mem_address`.
    async fn next_response(
        waiter: &mut Waiter,
        mem_address: Option<u16>,
        timeout: Duration,
    ) -> Result<Option<LinkRecord>> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = match waiter.recv_until(deadline).await {
                Ok(frame) => frame,
                Err(err) => return timed_out(err),
            };
            let Frame::Standard(msg) = frame else {
                continue;
            };
            let Some(data) = msg.data else {
                continue;
            };
            let record = LinkRecord::from_ext_data(&data);
            if mem_address.is_none_or(|mem| mem == record.mem_address) {
                trace!(device = %msg.from, record = %record, "link record");
                return Ok(Some(record));
            }
            trace!(
                device = %msg.from,
                mem = record.mem_address,
                "skipping record from another read"
            );
        }
    }
}

impl LinkDatabaseProtocol for DeviceAldbProtocol {
    fn first_address(&self) -> u16 {
        self.first_address
    }

    fn device(&self) -> Address {
        self.address
    }

    async fn get_first(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
        let mut slot = self.responses.lock().await;
        let waiter = self.ensure_waiter(&mut slot)?;
        waiter.drain();

        let code = self.request(0x0000, 0).await;
        if !code.is_success() {
            debug!(device = %self.address, %code, "read-all request failed");
            return Ok(None);
        }
        Self::next_response(waiter, None, timeout).await
    }

    async fn get_next(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
        let mut slot = self.responses.lock().await;
        let waiter = self.ensure_waiter(&mut slot)?;
        Self::next_response(waiter, None, timeout).await
    }

    async fn read_at(&self, mem_address: u16, timeout: Duration) -> Result<Option<LinkRecord>> {
        let mut slot = self.responses.lock().await;
        let waiter = self.ensure_waiter(&mut slot)?;
        waiter.drain();

        let code = self.request(mem_address, 1).await;
        if !code.is_success() {
            debug!(device = %self.address, mem = mem_address, %code, "read request failed");
            return Ok(None);
        }
        Self::next_response(waiter, Some(mem_address), timeout).await
    }

    async fn write(&self, record: &LinkRecord) -> ResultCode {
        let cmd = DirectCommand::extended(self.address, ALDB_CMD, 0x00, record.write_payload());
        self.modem.send_direct(&cmd).await
    }
}

impl std::fmt::Debug for DeviceAldbProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAldbProtocol")
            .field("address", &self.address)
            .field("first_address", &self.first_address)
            .finish()
    }
}

struct Cursor {
    records: Option<Waiter>,
    next: u16,
}

/// The modem's own link database.
///
/// The modem reports records without addresses, so addresses are assigned
/// in arrival order, descending from [`MODEM_FIRST_ADDRESS`]. A NAK to
/// get-first or get-next means the table has no more records and yields a
/// high-water-mark record at the next address.
pub struct ModemAldbProtocol {
    modem: Modem,
    address: Address,
    first_address: u16,
    cursor: Mutex<Cursor>,
}

impl ModemAldbProtocol {
    /// `address` is the modem's own address, as reported by
    /// [`Modem::get_info`].
    pub fn new(modem: Modem, address: Address) -> Self {
        Self {
            modem,
            address,
            first_address: MODEM_FIRST_ADDRESS,
            cursor: Mutex::new(Cursor {
                records: None,
                next: MODEM_FIRST_ADDRESS,
            }),
        }
    }

    async fn step(
        &self,
        command: ModemCommand,
        first: bool,
        timeout: Duration,
    ) -> Result<Option<LinkRecord>> {
        let mut guard = self.cursor.lock().await;
        let Cursor { records, next } = &mut *guard;
        if first {
            *next = self.first_address;
        }
        let mem_address = *next;
        if records.is_none() {
            *records = Some(self.modem.waiter(Topic::modem("all_link_record"), None)?);
        }
        let Some(records) = records.as_mut() else {
            return Err(ModemError::Shutdown.into());
        };
        records.drain();

        match self.modem.send_modem(&command).await {
            ResultCode::Success => {}
            ResultCode::Failure => {
                debug!(mem = mem_address, "modem link table ends");
                return Ok(Some(LinkRecord::high_water_mark(mem_address)));
            }
            code => {
                debug!(%code, "modem link table request failed");
                return Ok(None);
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            match records.recv_until(deadline).await {
                Ok(Frame::AllLinkRecord(record)) => {
                    let record = LinkRecord::from_all_link(&record, mem_address);
                    trace!(record = %record, "modem link record");
                    *next = mem_address.saturating_sub(RECORD_SIZE);
                    return Ok(Some(record));
                }
                Ok(_) => continue,
                Err(err) => return timed_out(err),
            }
        }
    }
}

impl LinkDatabaseProtocol for ModemAldbProtocol {
    fn first_address(&self) -> u16 {
        self.first_address
    }

    fn device(&self) -> Address {
        self.address
    }

    fn supports_direct_reads(&self) -> bool {
        false
    }

    async fn get_first(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
        self.step(ModemCommand::get_first_all_link(), true, timeout)
            .await
    }

    async fn get_next(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
        self.step(ModemCommand::get_next_all_link(), false, timeout)
            .await
    }

    async fn read_at(&self, _mem_address: u16, _timeout: Duration) -> Result<Option<LinkRecord>> {
        Ok(None)
    }

    async fn write(&self, record: &LinkRecord) -> ResultCode {
        let control = match (record.is_in_use(), record.is_controller()) {
            (false, _) => ManageRecord::DELETE,
            (true, true) => ManageRecord::ADD_CONTROLLER,
            (true, false) => ManageRecord::ADD_RESPONDER,
        };
        let manage = ManageRecord {
            control,
            flags: record.flags.to_byte(),
            group: record.group,
            address: record.target,
            data: record.data,
        };
        self.modem
            .send_modem(&ModemCommand::new(Outbound::ManageAllLink(manage)))
            .await
    }
}

impl std::fmt::Debug for ModemAldbProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemAldbProtocol")
            .field("address", &self.address)
            .finish()
    }
}
