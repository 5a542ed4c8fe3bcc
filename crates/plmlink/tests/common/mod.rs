//! A PowerLinc modem simulated over an in-memory duplex stream.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use plmlink::aldb::LinkRecord;
use plmlink::frame::{
    Address, AllLinkRecord, ExtData, Frame, ManageRecord, ModemInfo, MsgFlags, MsgType,
    StandardMessage, ACK, NAK,
};
use plmlink::modem::{Modem, ModemConfig};
use plmlink::transport::split;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const MODEM_ADDR: Address = Address::new(0x44, 0x85, 0x11);
pub const DEVICE: Address = Address::new(0x1a, 0x2b, 0x3c);

/// What the simulated network holds and what the host asked of it.
#[derive(Default)]
pub struct SimState {
    /// Link table of [`DEVICE`].
    pub device_records: BTreeMap<u16, LinkRecord>,
    /// Records left out of read-all responses.
    pub stream_skips: HashSet<u16>,
    /// The modem's own link table.
    pub modem_records: Vec<AllLinkRecord>,
    pub modem_cursor: usize,
    pub direct_reads: Vec<u16>,
    pub writes: Vec<LinkRecord>,
    pub manages: Vec<ManageRecord>,
}

pub type Shared = Arc<Mutex<SimState>>;

pub fn controller(mem: u16, group: u8, target: Address) -> LinkRecord {
    LinkRecord {
        mem_address: mem,
        ..LinkRecord::new(true, group, target, [0x03, 0x1f, 0x00])
    }
}

/// Start a modem driver wired to a simulated PLM.
pub fn start(state: SimState) -> (Modem, Shared) {
    start_with_config(state, ModemConfig::default())
}

pub fn start_with_config(state: SimState, config: ModemConfig) -> (Modem, Shared) {
    let (host, plm) = duplex(8192);
    let (transport, inbound) = split(host, 64);
    let shared = Arc::new(Mutex::new(state));
    tokio::spawn(serve(plm, shared.clone()));
    (Modem::start(transport, inbound, config), shared)
}

fn device_message(msg_type: MsgType, cmd1: u8, cmd2: u8) -> Vec<u8> {
    Frame::Standard(StandardMessage::standard(
        DEVICE,
        MODEM_ADDR,
        MsgFlags::new(msg_type, false),
        cmd1,
        cmd2,
    ))
    .to_bytes()
    .to_vec()
}

fn record_response(record: &LinkRecord) -> Vec<u8> {
    let mut data = ExtData::zeroed().with(2, 0x01);
    data.set_mem_address(record.mem_address);
    data.set_record(
        record.flags.to_byte(),
        record.group,
        record.target,
        record.data,
    );
    Frame::Standard(StandardMessage::extended(
        DEVICE,
        MODEM_ADDR,
        MsgFlags::new(MsgType::Direct, true),
        0x2f,
        0x00,
        data,
    ))
    .to_bytes()
    .to_vec()
}

fn echo(request: &[u8], ack: u8) -> Vec<u8> {
    let mut reply = request.to_vec();
    reply.push(ack);
    reply
}

async fn serve(mut plm: DuplexStream, state: Shared) {
    loop {
        let mut head = [0u8; 2];
        if plm.read_exact(&mut head).await.is_err() {
            return;
        }
        let reply = match head[1] {
            0x60 => Frame::ModemInfo(ModemInfo {
                address: MODEM_ADDR,
                category: 0x03,
                subcategory: 0x15,
                firmware: 0x9e,
                ack: plmlink::frame::Ack::Ack,
            })
            .to_bytes()
            .to_vec(),
            0x62 => {
                let mut body = [0u8; 6];
                if plm.read_exact(&mut body).await.is_err() {
                    return;
                }
                let mut request = head.to_vec();
                request.extend_from_slice(&body);
                let extended = body[3] & 0x10 != 0;
                let mut data = [0u8; 14];
                if extended {
                    if plm.read_exact(&mut data).await.is_err() {
                        return;
                    }
                    request.extend_from_slice(&data);
                }
                direct(
                    &state,
                    &request,
                    body[4],
                    body[5],
                    ExtData::from_bytes(data),
                )
            }
            0x69 | 0x6a => {
                let mut sim = state.lock().unwrap();
                if head[1] == 0x69 {
                    sim.modem_cursor = 0;
                }
                match sim.modem_records.get(sim.modem_cursor).copied() {
                    Some(record) => {
                        sim.modem_cursor += 1;
                        let mut reply = echo(&head, ACK);
                        reply.extend_from_slice(&Frame::AllLinkRecord(record).to_bytes());
                        reply
                    }
                    None => echo(&head, NAK),
                }
            }
            0x6f => {
                let mut body = [0u8; 9];
                if plm.read_exact(&mut body).await.is_err() {
                    return;
                }
                state.lock().unwrap().manages.push(ManageRecord {
                    control: body[0],
                    flags: body[1],
                    group: body[2],
                    address: Address::new(body[3], body[4], body[5]),
                    data: [body[6], body[7], body[8]],
                });
                let mut request = head.to_vec();
                request.extend_from_slice(&body);
                echo(&request, ACK)
            }
            _ => return,
        };
        if plm.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Answer a `0x62` send: echo, device ACK, then any link-database replies.
fn direct(state: &Shared, request: &[u8], cmd1: u8, cmd2: u8, data: ExtData) -> Vec<u8> {
    let mut reply = echo(request, ACK);
    reply.extend(device_message(MsgType::DirectAck, cmd1, cmd2));
    if cmd1 != 0x2f {
        return reply;
    }

    let mut sim = state.lock().unwrap();
    match data.get(2) {
        0x00 => {
            let mem = data.mem_address();
            if mem == 0 && data.get(5) == 0 {
                for record in sim.device_records.values().rev() {
                    if !sim.stream_skips.contains(&record.mem_address) {
                        reply.extend(record_response(record));
                    }
                }
            } else {
                sim.direct_reads.push(mem);
                if let Some(record) = sim.device_records.get(&mem) {
                    reply.extend(record_response(record));
                }
            }
        }
        0x02 => {
            let record = LinkRecord::from_ext_data(&data);
            sim.writes.push(record);
            sim.device_records.insert(record.mem_address, record);
        }
        _ => {}
    }
    reply
}
