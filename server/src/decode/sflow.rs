//! sFlow v5 decoder.
//!
//! Walks the datagram's samples looking for flow_sample (format 1) and
//! expanded_flow_sample (format 3) entries, and inside those for
//! sampled_header records carrying a raw Ethernet frame. The frame is
//! parsed down to IPv4 and TCP/UDP ports. sFlow sampling carries no
//! latency, so records come out with `latency_ms = 0`.

use std::net::Ipv4Addr;

use crate::decode::{be_u16, be_u32, FlowDecoder};
use crate::flow::{now_ts, FlowRecord};

const ETHERTYPE_IPV4: u16 = 0x0800;

/// Stateless sFlow v5 decoder.
#[derive(Default)]
pub struct SflowDecoder;

impl SflowDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FlowDecoder for SflowDecoder {
    fn decode(&self, data: &[u8], _exporter: &str) -> Vec<FlowRecord> {
        decode_sflow(data)
    }
}

/// Decode an sFlow v5 datagram into flow records.
pub fn decode_sflow(data: &[u8]) -> Vec<FlowRecord> {
    decode_datagram(data).unwrap_or_default()
}

fn decode_datagram(data: &[u8]) -> Option<Vec<FlowRecord>> {
    if be_u32(data, 0)? != 5 {
        return None;
    }

    // Agent address: type 1 = IPv4 (4 bytes), type 2 = IPv6 (16 bytes,
    // skipped — the agent address is not carried into records).
    let mut off = 4;
    let addr_type = be_u32(data, off)?;
    off += 4;
    off += match addr_type {
        1 => 4,
        2 => 16,
        _ => return None,
    };

    // sub_agent_id, sequence, sys_uptime, then the sample count.
    let num_samples = be_u32(data, off + 12)?;
    off += 16;

    let ts = now_ts();
    let mut flows = Vec::new();

    for _ in 0..num_samples {
        let (Some(tag), Some(len)) = (be_u32(data, off), be_u32(data, off + 4)) else {
            break;
        };
        off += 8;

        let len = len as usize;
        if off + len > data.len() {
            break;
        }
        let sample = &data[off..off + len];
        off += len;

        let enterprise = tag >> 12;
        let format = tag & 0xFFF;
        if enterprise != 0 {
            continue;
        }

        // format 1 = flow_sample (8 x u32 preamble),
        // format 3 = expanded_flow_sample (11 x u32 preamble).
        match format {
            1 => decode_flow_sample(sample, 32, &mut flows, ts),
            3 => decode_flow_sample(sample, 44, &mut flows, ts),
            _ => {}
        }
    }

    Some(flows)
}

/// Walk the records of a (possibly expanded) flow sample. The record
/// count sits in the last preamble word.
fn decode_flow_sample(sample: &[u8], preamble_len: usize, flows: &mut Vec<FlowRecord>, ts: f64) {
    let Some(record_count) = be_u32(sample, preamble_len - 4) else {
        return;
    };

    let mut off = preamble_len;
    for _ in 0..record_count {
        let (Some(tag), Some(len)) = (be_u32(sample, off), be_u32(sample, off + 4)) else {
            break;
        };
        off += 8;

        let len = len as usize;
        if off + len > sample.len() {
            break;
        }
        let record = &sample[off..off + len];
        off += len;

        // sampled_header is enterprise 0, format 1.
        if tag >> 12 == 0 && tag & 0xFFF == 1 {
            if let Some(flow) = decode_sampled_header(record, ts) {
                flows.push(flow);
            }
        }
    }
}

/// sampled_header: header_protocol(4), frame_length(4), stripped(4),
/// header_length(4), raw header bytes. Only Ethernet (protocol 1) is
/// handled.
fn decode_sampled_header(record: &[u8], ts: f64) -> Option<FlowRecord> {
    if record.len() < 16 {
        return None;
    }

    let header_protocol = be_u32(record, 0)?;
    let frame_length = be_u32(record, 4)?;
    let header_len = be_u32(record, 12)? as usize;

    if header_protocol != 1 {
        return None;
    }

    let end = (16 + header_len).min(record.len());
    let frame = &record[16..end];

    let (src, dst, src_port, dst_port, proto) = parse_ethernet_ipv4(frame)?;

    Some(FlowRecord {
        ts,
        src: src.to_string(),
        dst: dst.to_string(),
        src_port,
        dst_port,
        proto,
        latency_ms: 0.0,
        bytes: frame_length as u64,
        packets: 1,
        exporter: None,
    })
}

/// Parse Ethernet + IPv4 (+ TCP/UDP ports) out of a sampled frame.
/// Deliberately minimal: no VLAN tags, no IPv6. Non-TCP/UDP protocols
/// come back with zero ports and the protocol number as a string.
fn parse_ethernet_ipv4(frame: &[u8]) -> Option<(Ipv4Addr, Ipv4Addr, u16, u16, String)> {
    if frame.len() < 14 {
        return None;
    }
    if be_u16(frame, 12)? != ETHERTYPE_IPV4 {
        return None;
    }

    let ip_off = 14;
    if frame.len() < ip_off + 20 {
        return None;
    }

    let ver_ihl = frame[ip_off];
    if ver_ihl >> 4 != 4 {
        return None;
    }
    let ihl = ((ver_ihl & 0x0F) as usize) * 4;
    if frame.len() < ip_off + ihl {
        return None;
    }

    let proto = frame[ip_off + 9];
    let src = Ipv4Addr::from(be_u32(frame, ip_off + 12)?);
    let dst = Ipv4Addr::from(be_u32(frame, ip_off + 16)?);

    if proto == 6 || proto == 17 {
        let l4_off = ip_off + ihl;
        if frame.len() < l4_off + 4 {
            return None;
        }
        let src_port = be_u16(frame, l4_off)?;
        let dst_port = be_u16(frame, l4_off + 2)?;
        let proto_str = if proto == 6 { "TCP" } else { "UDP" };
        return Some((src, dst, src_port, dst_port, proto_str.to_string()));
    }

    Some((src, dst, 0, 0, proto.to_string()))
}
