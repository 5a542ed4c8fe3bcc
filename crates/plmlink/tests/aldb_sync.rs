mod common;

use plmlink::aldb::{
    AldbSync, DeviceAldbProtocol, LinkChangeKind, LinkRecord, LoadStatus, ModemAldbProtocol,
    ReadStrategy, SyncConfig, MODEM_FIRST_ADDRESS,
};
use plmlink::frame::{Address, AllLinkRecord, ManageRecord};
use plmlink::ResultCode;

use common::{controller, SimState, DEVICE, MODEM_ADDR};

fn two_link_table() -> SimState {
    let mut state = SimState::default();
    for record in [
        controller(0x0fff, 1, MODEM_ADDR),
        controller(0x0ff7, 2, MODEM_ADDR),
        LinkRecord::high_water_mark(0x0fef),
    ] {
        state.device_records.insert(record.mem_address, record);
    }
    state
}

fn sequential_only() -> SyncConfig {
    SyncConfig {
        probe_direct_reads: false,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn sequential_load_of_a_device() {
    let mut state = SimState::default();
    let first = controller(0x0fff, 1, MODEM_ADDR);
    assert_eq!(first.flags.to_byte(), 0xc2);
    state.device_records.insert(0x0fff, first);
    state
        .device_records
        .insert(0x0ff7, LinkRecord::high_water_mark(0x0ff7));
    let (modem, _sim) = common::start(state);

    let protocol = DeviceAldbProtocol::new(modem.clone(), DEVICE);
    let mut sync = AldbSync::new(protocol, sequential_only());
    assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);

    let store = sync.store();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(0x0fff), Some(&first));
    assert_eq!(store.high_water_mark(), Some(0x0ff7));
    assert!(store.find(1, MODEM_ADDR, true).is_some());

    modem.shutdown().await;
}

#[tokio::test]
async fn probe_selects_direct_reads() {
    let (modem, sim) = common::start(two_link_table());

    let protocol = DeviceAldbProtocol::new(modem.clone(), DEVICE);
    let mut sync = AldbSync::new(protocol, SyncConfig::default());
    assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
    assert_eq!(sync.strategy(), Some(ReadStrategy::Direct));
    assert_eq!(sync.store().len(), 2);

    // probe read, then one read per record
    assert_eq!(
        sim.lock().unwrap().direct_reads,
        vec![0x0fff, 0x0fff, 0x0ff7, 0x0fef]
    );

    modem.shutdown().await;
}

#[tokio::test]
async fn missing_record_is_read_directly() {
    let mut state = two_link_table();
    state.stream_skips.insert(0x0ff7);
    let (modem, sim) = common::start(state);

    let protocol = DeviceAldbProtocol::new(modem.clone(), DEVICE);
    let mut sync = AldbSync::new(protocol, sequential_only());
    assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
    assert_eq!(sync.store().get(0x0ff7).map(|r| r.group), Some(2));
    assert_eq!(sim.lock().unwrap().direct_reads, vec![0x0ff7]);

    modem.shutdown().await;
}

#[tokio::test]
async fn written_links_are_announced() {
    let (modem, sim) = common::start(two_link_table());

    let protocol = DeviceAldbProtocol::new(modem.clone(), DEVICE);
    let mut sync = AldbSync::new(protocol, sequential_only());
    sync.load().await.unwrap();
    let mut changes = sync.subscribe();

    let target = Address::new(0x2c, 0x3d, 0x4e);
    sync.store_mut().add(false, 3, target, [0xff, 0x1c, 0x01]);
    sync.store_mut().remove(0x0fff).unwrap();
    assert!(sync.store().get(0x0fef).unwrap().is_high_water_mark());

    assert_eq!(sync.write(false).await.unwrap(), ResultCode::Success);

    let writes = sim.lock().unwrap().writes.clone();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].mem_address, 0x0fff);
    assert!(!writes[0].is_in_use());
    assert_eq!(writes[1].mem_address, 0x0fef);
    assert_eq!(writes[1].target, target);

    assert_eq!(
        changes.recv().await.unwrap().kind,
        LinkChangeKind::ControllerRemoved
    );
    let created = changes.recv().await.unwrap();
    assert_eq!(created.kind, LinkChangeKind::ResponderCreated);
    assert_eq!(created.device, DEVICE);

    let store = sync.store();
    assert_eq!(store.high_water_mark(), Some(0x0fe7));
    assert_eq!(store.len(), 2);
    assert!(store.pending().is_empty());

    modem.shutdown().await;
}

#[tokio::test]
async fn write_before_load_is_refused() {
    let (modem, sim) = common::start(two_link_table());

    let protocol = DeviceAldbProtocol::new(modem.clone(), DEVICE);
    let mut sync = AldbSync::new(protocol, sequential_only());
    sync.store_mut().add(true, 1, MODEM_ADDR, [0; 3]);
    assert!(sync.write(false).await.is_err());
    assert!(sim.lock().unwrap().writes.is_empty());

    modem.shutdown().await;
}

#[tokio::test]
async fn modem_link_table() {
    let mut state = SimState::default();
    state.modem_records = vec![
        AllLinkRecord {
            flags: 0xe2,
            group: 0,
            address: DEVICE,
            data: [0x01, 0x20, 0x41],
        },
        AllLinkRecord {
            flags: 0xa2,
            group: 1,
            address: DEVICE,
            data: [0x01, 0x20, 0x41],
        },
    ];
    let (modem, sim) = common::start(state);

    let info = modem.get_info().await.unwrap();
    assert_eq!(info.address, MODEM_ADDR);

    let protocol = ModemAldbProtocol::new(modem.clone(), info.address);
    let mut sync = AldbSync::new(protocol, SyncConfig::default());
    assert_eq!(sync.load().await.unwrap(), LoadStatus::Loaded);
    assert_eq!(sync.strategy(), Some(ReadStrategy::Sequential));

    let store = sync.store();
    assert_eq!(store.len(), 2);
    assert!(store.get(MODEM_FIRST_ADDRESS).unwrap().is_controller());
    assert!(!store.get(MODEM_FIRST_ADDRESS - 8).unwrap().is_controller());
    assert_eq!(store.high_water_mark(), Some(MODEM_FIRST_ADDRESS - 16));

    sync.store_mut().add(false, 5, Address::new(1, 2, 3), [0; 3]);
    assert_eq!(sync.write(false).await.unwrap(), ResultCode::Success);
    let manages = sim.lock().unwrap().manages.clone();
    assert_eq!(manages.len(), 1);
    assert_eq!(manages[0].control, ManageRecord::ADD_RESPONDER);
    assert_eq!(manages[0].group, 5);

    modem.shutdown().await;
}
