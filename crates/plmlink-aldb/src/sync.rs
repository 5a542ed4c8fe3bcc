use std::time::Duration;

use plmlink_modem::ResultCode;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{AldbError, Result};
use crate::events::LinkChange;
use crate::protocol::LinkDatabaseProtocol;
use crate::record::{LinkRecord, RECORD_SIZE};
use crate::store::{Aldb, LoadStatus, PendingKey};

const CHANGE_CHANNEL_DEPTH: usize = 64;

/// How records are fetched during a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Get-first then get-next until the high-water mark.
    Sequential,
    /// One read per address, walking down from the first address.
    Direct,
}

/// Keeps an [`Aldb`] in step with the table on a device.
///
/// Loads replace the mirror with what the device reports. Writes apply the
/// store's staged changes one record at a time; each success is committed
/// to the mirror and announced on [`AldbSync::subscribe`].
pub struct AldbSync<P> {
    protocol: P,
    config: SyncConfig,
    store: Aldb,
    strategy: Option<ReadStrategy>,
    changes: broadcast::Sender<LinkChange>,
}

impl<P: LinkDatabaseProtocol> AldbSync<P> {
    pub fn new(protocol: P, config: SyncConfig) -> Self {
        let store = Aldb::new(protocol.first_address());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_DEPTH);
        Self {
            protocol,
            config,
            store,
            strategy: None,
            changes,
        }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Aldb {
        &self.store
    }

    /// The mirror, for staging changes.
    pub fn store_mut(&mut self) -> &mut Aldb {
        &mut self.store
    }

    /// Receive a [`LinkChange`] for every record written from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkChange> {
        self.changes.subscribe()
    }

    /// The strategy chosen by an earlier probe.
    pub fn strategy(&self) -> Option<ReadStrategy> {
        self.strategy
    }

    /// Decide how this device's table is read.
    ///
    /// Reads the first record sequentially and again directly; the device
    /// supports direct reads if both agree. The answer is kept for later
    /// loads once the device has answered at all.
    pub async fn probe(&mut self) -> Result<ReadStrategy> {
        if let Some(strategy) = self.strategy {
            return Ok(strategy);
        }
        if !self.config.probe_direct_reads || !self.protocol.supports_direct_reads() {
            self.strategy = Some(ReadStrategy::Sequential);
            return Ok(ReadStrategy::Sequential);
        }

        let device = self.protocol.device();
        let timeout = self.config.read_timeout;
        let Some(sequential) = self.protocol.get_first(timeout).await? else {
            debug!(%device, "probe got no record; reading sequentially");
            return Ok(ReadStrategy::Sequential);
        };
        let direct = self
            .protocol
            .read_at(self.protocol.first_address(), timeout)
            .await?;

        let strategy = if direct == Some(sequential) {
            ReadStrategy::Direct
        } else {
            ReadStrategy::Sequential
        };
        debug!(%device, ?strategy, "probed link database");
        self.strategy = Some(strategy);
        Ok(strategy)
    }

    /// Read the whole table into the mirror.
    ///
    /// Records missing after the bulk read are re-read one address at a
    /// time. The returned status is `Loaded` only for an unbroken table;
    /// `Failed` if the device returned nothing.
    pub async fn load(&mut self) -> Result<LoadStatus> {
        let device = self.protocol.device();
        let deadline = Instant::now() + self.config.load_ceiling;

        self.store.clear();
        self.store.set_status(LoadStatus::Loading);

        let strategy = self.probe().await?;
        info!(%device, ?strategy, "loading link database");
        match strategy {
            ReadStrategy::Sequential => self.read_sequential(deadline).await?,
            ReadStrategy::Direct => self.read_direct(deadline).await?,
        }
        if self.protocol.supports_direct_reads() {
            self.repair_gaps(deadline).await?;
        }

        let status = match self.store.derived_status() {
            LoadStatus::Loaded => LoadStatus::Loaded,
            LoadStatus::Empty => LoadStatus::Failed,
            _ => LoadStatus::Partial,
        };
        self.store.set_status(status);
        info!(%device, %status, records = self.store.len(), "link database load finished");
        Ok(status)
    }

    fn step_timeout(&self, wanted: Duration, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(device = %self.protocol.device(), "link database load hit its time limit");
            return None;
        }
        Some(wanted.min(remaining))
    }

    async fn read_sequential(&mut self, deadline: Instant) -> Result<()> {
        let device = self.protocol.device();
        let mut started = false;
        let mut attempts = 0;
        loop {
            let Some(timeout) = self.step_timeout(self.config.read_timeout, deadline) else {
                return Ok(());
            };
            let record = if started {
                self.protocol.get_next(timeout).await?
            } else {
                self.protocol.get_first(timeout).await?
            };
            match record {
                Some(record) => {
                    started = true;
                    attempts = 0;
                    self.store.insert(record);
                    if record.is_high_water_mark() {
                        return Ok(());
                    }
                }
                None => {
                    attempts += 1;
                    if attempts >= self.config.step_retries {
                        debug!(%device, attempts, "sequential read stalled");
                        return Ok(());
                    }
                    debug!(%device, attempts, "retrying sequential read");
                }
            }
        }
    }

    async fn read_direct(&mut self, deadline: Instant) -> Result<()> {
        let mut mem = self.protocol.first_address();
        let mut attempts = 0;
        loop {
            let Some(timeout) = self.step_timeout(self.config.read_timeout, deadline) else {
                return Ok(());
            };
            match self.protocol.read_at(mem, timeout).await? {
                Some(record) => {
                    attempts = 0;
                    self.store.insert(record);
                    if record.is_high_water_mark() {
                        return Ok(());
                    }
                    match mem.checked_sub(RECORD_SIZE) {
                        Some(next) => mem = next,
                        None => return Ok(()),
                    }
                }
                None => {
                    attempts += 1;
                    if attempts >= self.config.step_retries {
                        debug!(device = %self.protocol.device(), mem, "direct read stalled");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Re-read missing addresses, highest first, until the table is whole.
    async fn repair_gaps(&mut self, deadline: Instant) -> Result<()> {
        let device = self.protocol.device();
        while let Some(mem) = self.store.first_gap() {
            let mut repaired = false;
            for attempt in 1..=self.config.gap_retries {
                let Some(timeout) = self.step_timeout(self.config.gap_timeout(attempt), deadline)
                else {
                    return Ok(());
                };
                if let Some(record) = self.protocol.read_at(mem, timeout).await? {
                    self.store.insert(record);
                    repaired = true;
                    break;
                }
                debug!(%device, mem, attempt, "missing record still unread");
            }
            if !repaired {
                warn!(%device, mem, "giving up on missing link record");
                return Ok(());
            }
        }
        Ok(())
    }

    /// Write every staged change to the device.
    ///
    /// New records go to the high-water-mark slot. Changes that fail after
    /// all attempts stay staged. Returns the worst outcome of all writes.
    pub async fn write(&mut self, force: bool) -> Result<ResultCode> {
        if !force && !self.store.is_loaded() {
            return Err(AldbError::WriteWithoutLoad);
        }
        let device = self.protocol.device();
        let was_loaded = self.store.is_loaded();
        let staged: Vec<(PendingKey, LinkRecord)> = self
            .store
            .pending()
            .iter()
            .map(|(key, record)| (*key, *record))
            .collect();

        let mut codes = Vec::with_capacity(staged.len());
        for (key, mut record) in staged {
            if matches!(key, PendingKey::New(_)) {
                record.mem_address = self.store.next_free_slot();
            }
            let code = self.write_record(&record).await;
            if code.is_success() {
                debug!(%device, record = %record, "link record written");
                self.store.commit(key, record);
                // No receivers is fine.
                let _ = self.changes.send(LinkChange::new(device, record));
            } else {
                warn!(%device, mem = record.mem_address, %code, "link write failed; change kept");
            }
            codes.push(code);
        }
        // A forced write into an unread table leaves it partially known.
        if !was_loaded && self.store.iter().next().is_some() {
            self.store.set_status(LoadStatus::Partial);
        }
        Ok(ResultCode::worst(codes))
    }

    async fn write_record(&self, record: &LinkRecord) -> ResultCode {
        let mut code = ResultCode::Unsent;
        for attempt in 1..=self.config.write_retries.max(1) {
            code = self.protocol.write(record).await;
            if code.is_success() {
                break;
            }
            debug!(mem = record.mem_address, attempt, %code, "link write attempt failed");
        }
        code
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for AldbSync<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AldbSync")
            .field("protocol", &self.protocol)
            .field("status", &self.store.status())
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    use plmlink_frame::Address;

    use super::*;

    const FIRST: u16 = 0x0fff;

    fn target() -> Address {
        Address::new(0x44, 0x85, 0x11)
    }

    fn link(mem: u16, controller: bool, group: u8) -> LinkRecord {
        LinkRecord {
            mem_address: mem,
            ..LinkRecord::new(controller, group, target(), [0; 3])
        }
    }

    fn table() -> Vec<LinkRecord> {
        vec![
            link(0x0fff, true, 1),
            link(0x0ff7, false, 1),
            link(0x0fef, true, 2),
            LinkRecord::high_water_mark(0x0fe7),
        ]
    }

    #[derive(Default)]
    struct State {
        cursor: VecDeque<LinkRecord>,
        direct_misses: HashMap<u16, u32>,
        direct_reads: u32,
        stalls: HashMap<u16, u32>,
        sequential_reads: u32,
        read_timeouts: Vec<Duration>,
        writes: Vec<LinkRecord>,
        write_codes: VecDeque<ResultCode>,
    }

    struct FakeDevice {
        records: BTreeMap<u16, LinkRecord>,
        direct: bool,
        sequential_skips: HashSet<u16>,
        state: Mutex<State>,
    }

    impl FakeDevice {
        fn new(records: Vec<LinkRecord>) -> Self {
            Self {
                records: records.into_iter().map(|r| (r.mem_address, r)).collect(),
                direct: true,
                sequential_skips: HashSet::new(),
                state: Mutex::new(State::default()),
            }
        }

        fn skipping(mut self, mem: u16) -> Self {
            self.sequential_skips.insert(mem);
            self
        }

        fn without_direct_reads(mut self) -> Self {
            self.direct = false;
            self
        }

        fn missing_direct(self, mem: u16, times: u32) -> Self {
            self.state.lock().unwrap().direct_misses.insert(mem, times);
            self
        }

        fn stalling_before(self, mem: u16, times: u32) -> Self {
            self.state.lock().unwrap().stalls.insert(mem, times);
            self
        }

        fn failing_writes(self, codes: &[ResultCode]) -> Self {
            self.state
                .lock()
                .unwrap()
                .write_codes
                .extend(codes.iter().copied());
            self
        }

        fn direct_reads(&self) -> u32 {
            self.state.lock().unwrap().direct_reads
        }

        fn sequential_reads(&self) -> u32 {
            self.state.lock().unwrap().sequential_reads
        }

        fn read_timeouts(&self) -> Vec<Duration> {
            self.state.lock().unwrap().read_timeouts.clone()
        }

        fn writes(&self) -> Vec<LinkRecord> {
            self.state.lock().unwrap().writes.clone()
        }
    }

    impl LinkDatabaseProtocol for FakeDevice {
        fn first_address(&self) -> u16 {
            FIRST
        }

        fn device(&self) -> Address {
            Address::new(0x1a, 0x2b, 0x3c)
        }

        fn supports_direct_reads(&self) -> bool {
            self.direct
        }

        async fn get_first(&self, _timeout: Duration) -> Result<Option<LinkRecord>> {
            let mut state = self.state.lock().unwrap();
            state.sequential_reads += 1;
            state.cursor = self
                .records
                .values()
                .rev()
                .filter(|r| !self.sequential_skips.contains(&r.mem_address))
                .copied()
                .collect();
            Ok(state.cursor.pop_front())
        }

        async fn get_next(&self, _timeout: Duration) -> Result<Option<LinkRecord>> {
            let mut state = self.state.lock().unwrap();
            state.sequential_reads += 1;
            let Some(mem) = state.cursor.front().map(|r| r.mem_address) else {
                return Ok(None);
            };
            if let Some(stalls) = state.stalls.get_mut(&mem) {
                if *stalls > 0 {
                    *stalls -= 1;
                    return Ok(None);
                }
            }
            Ok(state.cursor.pop_front())
        }

        async fn read_at(&self, mem: u16, timeout: Duration) -> Result<Option<LinkRecord>> {
            let mut state = self.state.lock().unwrap();
            state.direct_reads += 1;
            state.read_timeouts.push(timeout);
            if !self.direct {
                return Ok(None);
            }
            if let Some(misses) = state.direct_misses.get_mut(&mem) {
                if *misses > 0 {
                    *misses -= 1;
                    return Ok(None);
                }
            }
            Ok(self.records.get(&mem).copied())
        }

        async fn write(&self, record: &LinkRecord) -> ResultCode {
            let mut state = self.state.lock().unwrap();
            state.writes.push(*record);
            state
                .write_codes
                .pop_front()
                .unwrap_or(ResultCode::Success)
        }
    }

    fn sequential_only() -> SyncConfig {
        SyncConfig {
            probe_direct_reads: false,
            ..SyncConfig::default()
        }
    }

    async fn loaded(device: FakeDevice) -> AldbSync<FakeDevice> {
        let mut sync = AldbSync::new(device, sequential_only());
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
        sync
    }

    #[tokio::test]
    async fn sequential_load() {
        let sync = loaded(FakeDevice::new(table())).await;
        assert_eq!(sync.store().len(), 3);
        assert_eq!(sync.store().high_water_mark(), Some(0x0fe7));
        assert_eq!(sync.strategy(), Some(ReadStrategy::Sequential));
        assert_eq!(sync.protocol().direct_reads(), 0);
    }

    #[tokio::test]
    async fn probe_picks_direct_when_reads_agree() {
        let mut sync = AldbSync::new(FakeDevice::new(table()), SyncConfig::default());
        assert_eq!(sync.probe().await.unwrap(), ReadStrategy::Direct);
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
        assert_eq!(sync.store().len(), 3);
        // one probe read plus one per record
        assert_eq!(sync.protocol().direct_reads(), 5);
    }

    #[tokio::test]
    async fn probe_falls_back_without_direct_reads() {
        let device = FakeDevice::new(table()).without_direct_reads();
        let mut sync = AldbSync::new(device, SyncConfig::default());
        assert_eq!(sync.probe().await.unwrap(), ReadStrategy::Sequential);
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
        assert_eq!(sync.protocol().direct_reads(), 0);
    }

    #[tokio::test]
    async fn probe_picks_sequential_when_direct_read_misses() {
        let device = FakeDevice::new(table()).missing_direct(FIRST, 1);
        let mut sync = AldbSync::new(device, SyncConfig::default());
        assert_eq!(sync.probe().await.unwrap(), ReadStrategy::Sequential);
        assert_eq!(sync.strategy(), Some(ReadStrategy::Sequential));
    }

    #[tokio::test]
    async fn probe_without_answer_is_not_cached() {
        let mut sync = AldbSync::new(FakeDevice::new(Vec::new()), SyncConfig::default());
        assert_eq!(sync.probe().await.unwrap(), ReadStrategy::Sequential);
        assert_eq!(sync.strategy(), None);
    }

    #[tokio::test]
    async fn gap_repair_fills_missing_record() {
        let device = FakeDevice::new(table())
            .skipping(0x0ff7)
            .missing_direct(0x0ff7, 4);
        let sync = loaded(device).await;
        assert_eq!(sync.store().get(0x0ff7), Some(&link(0x0ff7, false, 1)));
        assert_eq!(sync.protocol().direct_reads(), 5);
    }

    #[tokio::test]
    async fn sequential_retries_reset_after_each_record() {
        // two misses before each of two records: five misses in total,
        // never three in a row
        let device = FakeDevice::new(table())
            .without_direct_reads()
            .stalling_before(0x0ff7, 2)
            .stalling_before(0x0fef, 2);
        let sync = loaded(device).await;
        assert_eq!(sync.store().len(), 3);
        assert_eq!(sync.store().high_water_mark(), Some(0x0fe7));
        assert_eq!(sync.strategy(), Some(ReadStrategy::Sequential));
        assert_eq!(sync.protocol().direct_reads(), 0);
        assert_eq!(sync.protocol().sequential_reads(), 8);
    }

    #[tokio::test]
    async fn sequential_stall_ends_read() {
        let device = FakeDevice::new(table())
            .without_direct_reads()
            .stalling_before(0x0fef, 3);
        let mut sync = AldbSync::new(device, sequential_only());
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Partial);
        assert_eq!(sync.store().len(), 2);
        assert_eq!(sync.protocol().sequential_reads(), 5);
    }

    #[tokio::test]
    async fn gap_timeout_grows_per_attempt() {
        let device = FakeDevice::new(table())
            .skipping(0x0ff7)
            .missing_direct(0x0ff7, 3);
        let sync = loaded(device).await;
        let secs: Vec<u64> = sync
            .protocol()
            .read_timeouts()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(secs, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn gap_repair_gives_up() {
        let device = FakeDevice::new(table())
            .skipping(0x0ff7)
            .missing_direct(0x0ff7, u32::MAX);
        let mut sync = AldbSync::new(device, sequential_only());
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Partial);
        assert_eq!(sync.protocol().direct_reads(), 20);
        assert_eq!(sync.store().status(), LoadStatus::Partial);
    }

    #[tokio::test]
    async fn nothing_read_is_failed() {
        let device = FakeDevice::new(Vec::new());
        let mut sync = AldbSync::new(device, sequential_only());
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Failed);
        assert!(sync.store().is_empty());
        assert_eq!(sync.protocol().sequential_reads(), 3);
    }

    #[tokio::test]
    async fn zero_ceiling_reads_nothing() {
        let config = SyncConfig {
            load_ceiling: Duration::ZERO,
            ..sequential_only()
        };
        let mut sync = AldbSync::new(FakeDevice::new(table()), config);
        assert_eq!(sync.load().await.unwrap(), LoadStatus::Failed);
    }

    #[tokio::test]
    async fn write_requires_load() {
        let mut sync = AldbSync::new(FakeDevice::new(table()), sequential_only());
        sync.store_mut().add(true, 3, target(), [0; 3]);
        assert!(matches!(
            sync.write(false).await,
            Err(AldbError::WriteWithoutLoad)
        ));
        assert_eq!(sync.write(true).await.unwrap(), ResultCode::Success);
        assert!(sync.store().pending().is_empty());
    }

    #[tokio::test]
    async fn forced_write_leaves_unread_table_partial() {
        let mut sync = AldbSync::new(FakeDevice::new(table()), sequential_only());
        sync.store_mut().add(true, 3, target(), [0; 3]);

        assert_eq!(sync.write(true).await.unwrap(), ResultCode::Success);
        assert_eq!(sync.protocol().writes()[0].mem_address, FIRST);
        assert_eq!(sync.store().status(), LoadStatus::Partial);
        assert_eq!(sync.store().high_water_mark(), None);
        assert_eq!(sync.store().len(), 1);
        assert_ne!(sync.store().derived_status(), LoadStatus::Loaded);
        assert!(matches!(
            sync.write(false).await,
            Err(AldbError::WriteWithoutLoad)
        ));
    }

    #[tokio::test]
    async fn write_keeps_loaded_status() {
        let mut sync = loaded(FakeDevice::new(table())).await;
        sync.store_mut().add(true, 8, target(), [0; 3]);
        assert_eq!(sync.write(true).await.unwrap(), ResultCode::Success);
        assert_eq!(sync.store().status(), LoadStatus::Loaded);
    }

    #[tokio::test]
    async fn new_record_goes_to_high_water_mark() {
        let mut sync = loaded(FakeDevice::new(table())).await;
        let mut changes = sync.subscribe();
        sync.store_mut().add(false, 7, Address::new(9, 9, 9), [1, 2, 3]);

        assert_eq!(sync.write(false).await.unwrap(), ResultCode::Success);

        let written = sync.protocol().writes();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].mem_address, 0x0fe7);
        assert_eq!(sync.store().high_water_mark(), Some(0x0fdf));
        assert_eq!(sync.store().len(), 4);

        let change = changes.try_recv().unwrap();
        assert_eq!(change.kind, crate::events::LinkChangeKind::ResponderCreated);
        assert_eq!(change.record.mem_address, 0x0fe7);
    }

    #[tokio::test]
    async fn remove_announces_removal() {
        let mut sync = loaded(FakeDevice::new(table())).await;
        let mut changes = sync.subscribe();
        sync.store_mut().remove(0x0fff).unwrap();

        assert_eq!(sync.write(false).await.unwrap(), ResultCode::Success);
        assert!(!sync.store().get(0x0fff).unwrap().is_in_use());
        assert_eq!(
            changes.try_recv().unwrap().kind,
            crate::events::LinkChangeKind::ControllerRemoved
        );
    }

    #[tokio::test]
    async fn failed_write_stays_queued() {
        let device = FakeDevice::new(table()).failing_writes(&[
            ResultCode::DeviceUnresponsive,
            ResultCode::DeviceUnresponsive,
            ResultCode::DeviceUnresponsive,
        ]);
        let mut sync = loaded(device).await;
        let mut changes = sync.subscribe();
        sync.store_mut().add(true, 4, target(), [0; 3]);
        sync.store_mut().remove(0x0ff7).unwrap();

        let code = sync.write(false).await.unwrap();
        assert_eq!(code, ResultCode::DeviceUnresponsive);
        // three failed attempts at the removal, then the add succeeds
        assert_eq!(sync.protocol().writes().len(), 4);
        assert_eq!(sync.store().pending().len(), 1);
        assert!(sync
            .store()
            .pending()
            .contains_key(&PendingKey::Existing(0x0ff7)));
        assert!(sync.store().get(0x0ff7).unwrap().is_in_use());
        assert_eq!(
            changes.try_recv().unwrap().kind,
            crate::events::LinkChangeKind::ControllerCreated
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn nothing_staged_is_success() {
        let mut sync = loaded(FakeDevice::new(table())).await;
        assert_eq!(sync.write(false).await.unwrap(), ResultCode::Success);
        assert!(sync.protocol().writes().is_empty());
    }
}
