//! NetFlow v5 (fixed layout) and v9 (templated) decoders.
//!
//! v5 datagrams are a 24-byte header followed by 48-byte records. v9
//! datagrams carry FlowSets: template FlowSets (id 0) announce field
//! layouts that data FlowSets (id >= 256) are decoded against, so the
//! decoder keeps a template cache scoped by `(exporter, source id)`.

use std::net::Ipv4Addr;

use crate::decode::template::{Template, TemplateCache, TemplateField};
use crate::decode::{be_u16, be_u32, be_u64, FlowDecoder};
use crate::flow::{now_ts, FlowRecord};

pub const V5_HEADER_LEN: usize = 24;
pub const V5_RECORD_LEN: usize = 48;
pub const V9_HEADER_LEN: usize = 20;

/// The minimal field-type subset mapped to record semantics. IDs are
/// shared between NetFlow v9 and the IPFIX IE registry.
pub const FIELD_BYTES: u16 = 1;
pub const FIELD_PACKETS: u16 = 2;
pub const FIELD_PROTO: u16 = 4;
pub const FIELD_SRC_PORT: u16 = 7;
pub const FIELD_SRC_IPV4: u16 = 8;
pub const FIELD_DST_PORT: u16 = 11;
pub const FIELD_DST_IPV4: u16 = 12;

/// NetFlow decoder handling both v5 and v9, with a template cache for
/// the v9 path.
#[derive(Default)]
pub struct NetflowDecoder {
    templates: TemplateCache,
}

impl NetflowDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}

impl FlowDecoder for NetflowDecoder {
    fn decode(&self, data: &[u8], exporter: &str) -> Vec<FlowRecord> {
        match be_u16(data, 0) {
            Some(5) => decode_v5(data),
            Some(9) => decode_v9(data, exporter, &self.templates),
            _ => Vec::new(),
        }
    }
}

/// Decode a NetFlow v5 packet: 24-byte header + `count` 48-byte records.
/// `count` is capped by the bytes actually present.
pub fn decode_v5(data: &[u8]) -> Vec<FlowRecord> {
    if data.len() < V5_HEADER_LEN {
        return Vec::new();
    }
    let Some(version) = be_u16(data, 0) else {
        return Vec::new();
    };
    if version != 5 {
        return Vec::new();
    }

    let count = be_u16(data, 2).unwrap_or(0) as usize;
    let unix_secs = be_u32(data, 8).unwrap_or(0);
    let ts = if unix_secs != 0 {
        unix_secs as f64
    } else {
        now_ts()
    };

    let max_records = (data.len() - V5_HEADER_LEN) / V5_RECORD_LEN;
    let count = count.min(max_records);

    let mut flows = Vec::with_capacity(count);
    for i in 0..count {
        let off = V5_HEADER_LEN + i * V5_RECORD_LEN;
        if let Some(flow) = parse_v5_record(&data[off..off + V5_RECORD_LEN], ts) {
            flows.push(flow);
        }
    }
    flows
}

/// Parse one 48-byte v5 record: srcaddr(4), dstaddr(4), nexthop(4),
/// input(2), output(2), dPkts(4), dOctets(4), First(4), Last(4),
/// srcport(2), dstport(2), pad(1), tcp_flags(1), prot(1), ...
fn parse_v5_record(buf: &[u8], ts: f64) -> Option<FlowRecord> {
    if buf.len() < V5_RECORD_LEN {
        return None;
    }

    let src = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let dst = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
    let packets = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
    let bytes = u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]);
    let src_port = u16::from_be_bytes([buf[32], buf[33]]);
    let dst_port = u16::from_be_bytes([buf[34], buf[35]]);
    let proto = buf[38];

    Some(FlowRecord {
        ts,
        src: src.to_string(),
        dst: dst.to_string(),
        src_port,
        dst_port,
        proto: proto.to_string(),
        latency_ms: 0.0,
        bytes: bytes as u64,
        packets: packets as u64,
        exporter: None,
    })
}

/// Decode a NetFlow v9 packet. Header: version(2), count(2),
/// sys_uptime(4), unix_secs(4), sequence(4), source_id(4); then FlowSets.
pub fn decode_v9(data: &[u8], exporter: &str, cache: &TemplateCache) -> Vec<FlowRecord> {
    if data.len() < V9_HEADER_LEN {
        return Vec::new();
    }
    if be_u16(data, 0) != Some(9) {
        return Vec::new();
    }

    let unix_secs = be_u32(data, 8).unwrap_or(0);
    let source_id = be_u32(data, 16).unwrap_or(0);
    let ts = if unix_secs != 0 {
        unix_secs as f64
    } else {
        now_ts()
    };

    let mut flows = Vec::new();
    let mut offset = V9_HEADER_LEN;

    while let (Some(set_id), Some(set_len)) = (be_u16(data, offset), be_u16(data, offset + 2)) {
        let set_len = set_len as usize;
        if set_len < 4 {
            break;
        }
        let end = offset + set_len;
        if end > data.len() {
            break;
        }

        let body = &data[offset + 4..end];
        match set_id {
            0 => parse_template_flowset(body, exporter, source_id, cache),
            1 => {} // options templates not handled
            id if id >= 256 => {
                // Data FlowSet: the set id is the template id. A set
                // whose template has not been seen yet is skipped.
                if let Some(template) = cache.get(exporter, source_id, id) {
                    flows.extend(parse_data_records(body, &template, ts));
                }
            }
            _ => {}
        }

        offset = end;
    }

    flows
}

/// Template FlowSet: a sequence of `template_id(2), field_count(2),
/// field_count x (type(2), length(2))` records. Trailing padding falls
/// out of the loop.
fn parse_template_flowset(body: &[u8], exporter: &str, source_id: u32, cache: &TemplateCache) {
    let mut off = 0;

    while let (Some(template_id), Some(field_count)) = (be_u16(body, off), be_u16(body, off + 2)) {
        off += 4;

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let (Some(field_type), Some(field_len)) = (be_u16(body, off), be_u16(body, off + 2))
            else {
                return;
            };
            off += 4;
            fields.push(TemplateField {
                field_type,
                field_len,
                enterprise: None,
            });
        }

        cache.put(exporter, source_id, Template { template_id, fields });
    }
}

/// Iterate fixed-size data records against a template. Shared with the
/// IPFIX and jFlow paths: once a template is cached, record decoding is
/// identical across the three families.
pub(crate) fn parse_data_records(body: &[u8], template: &Template, ts: f64) -> Vec<FlowRecord> {
    let record_len = template.record_len();
    if record_len == 0 {
        return Vec::new();
    }

    let mut flows = Vec::new();
    let mut off = 0;

    while off + record_len <= body.len() {
        let record = &body[off..off + record_len];
        off += record_len;

        if let Some(flow) = parse_data_record(record, template, ts) {
            flows.push(flow);
        }
    }

    flows
}

fn parse_data_record(record: &[u8], template: &Template, ts: f64) -> Option<FlowRecord> {
    let mut src_ip: Option<Ipv4Addr> = None;
    let mut dst_ip: Option<Ipv4Addr> = None;
    let mut src_port: u16 = 0;
    let mut dst_port: u16 = 0;
    let mut proto: u64 = 0;
    let mut bytes: u64 = 0;
    let mut packets: u64 = 0;

    let mut p = 0;
    for field in &template.fields {
        let len = field.field_len as usize;
        let raw = &record[p..p + len];
        p += len;

        // Only the common fixed widths decode; anything else skips the
        // field but keeps walking the record.
        let value = match len {
            1 => Some(raw[0] as u64),
            2 => be_u16(raw, 0).map(u64::from),
            4 => be_u32(raw, 0).map(u64::from),
            8 => be_u64(raw, 0),
            _ => None,
        };
        let Some(value) = value else {
            continue;
        };

        match field.field_type {
            FIELD_SRC_IPV4 => src_ip = Some(Ipv4Addr::from(value as u32)),
            FIELD_DST_IPV4 => dst_ip = Some(Ipv4Addr::from(value as u32)),
            FIELD_SRC_PORT => src_port = value as u16,
            FIELD_DST_PORT => dst_port = value as u16,
            FIELD_PROTO => proto = value,
            FIELD_BYTES => bytes = value,
            FIELD_PACKETS => packets = value,
            _ => {}
        }
    }

    // A record without both addresses is dropped.
    let src = src_ip?;
    let dst = dst_ip?;

    Some(FlowRecord {
        ts,
        src: src.to_string(),
        dst: dst.to_string(),
        src_port,
        dst_port,
        proto: proto.to_string(),
        latency_ms: 0.0,
        bytes,
        packets,
        exporter: None,
    })
}
