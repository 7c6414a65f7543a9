//! IPFIX (NetFlow v10, RFC 7011) decoder.
//!
//! Same set structure as NetFlow v9 with different set ids (2 = template,
//! 3 = options template, >= 256 = data) and one wrinkle in the field
//! specifier: when the high bit of the IE id is set, a 4-byte enterprise
//! number follows and the effective id is the low 15 bits. Templates are
//! scoped by `(exporter, observation domain)`.

use crate::decode::netflow::parse_data_records;
use crate::decode::template::{Template, TemplateCache, TemplateField};
use crate::decode::{be_u16, be_u32, FlowDecoder};
use crate::flow::{now_ts, FlowRecord};

pub const IPFIX_HEADER_LEN: usize = 16;

/// IPFIX message decoder with a template cache keyed by
/// `(exporter, observation domain)`.
#[derive(Default)]
pub struct IpfixDecoder {
    templates: TemplateCache,
}

impl IpfixDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}

impl FlowDecoder for IpfixDecoder {
    fn decode(&self, data: &[u8], exporter: &str) -> Vec<FlowRecord> {
        decode_ipfix(data, exporter, &self.templates)
    }
}

/// Decode an IPFIX message. Header: version(2)=10, length(2),
/// export_time(4), sequence(4), observation_domain(4); then sets.
pub fn decode_ipfix(data: &[u8], exporter: &str, cache: &TemplateCache) -> Vec<FlowRecord> {
    if data.len() < IPFIX_HEADER_LEN {
        return Vec::new();
    }
    if be_u16(data, 0) != Some(10) {
        return Vec::new();
    }

    let length = be_u16(data, 2).unwrap_or(0) as usize;
    let export_time = be_u32(data, 4).unwrap_or(0);
    let obs_domain = be_u32(data, 12).unwrap_or(0);

    let ts = if export_time != 0 {
        export_time as f64
    } else {
        now_ts()
    };

    // Trust the header length when it is sane and shorter than the
    // datagram; otherwise fall back to what was received.
    let msg = if length >= IPFIX_HEADER_LEN && length < data.len() {
        &data[..length]
    } else {
        data
    };

    let mut flows = Vec::new();
    let mut offset = IPFIX_HEADER_LEN;

    while let (Some(set_id), Some(set_len)) = (be_u16(msg, offset), be_u16(msg, offset + 2)) {
        let set_len = set_len as usize;
        if set_len < 4 {
            break;
        }
        let end = offset + set_len;
        if end > msg.len() {
            break;
        }

        let body = &msg[offset + 4..end];
        match set_id {
            2 => parse_template_set(body, exporter, obs_domain, cache),
            3 => {} // options templates not handled
            id if id >= 256 => {
                if let Some(template) = cache.get(exporter, obs_domain, id) {
                    flows.extend(parse_data_records(body, &template, ts));
                }
            }
            _ => {}
        }

        offset = end;
    }

    flows
}

/// Template set: `template_id(2), field_count(2)` then field specifiers
/// of `ie_id(2), length(2)` with an optional trailing enterprise number
/// when the ie_id enterprise bit is set.
fn parse_template_set(body: &[u8], exporter: &str, obs_domain: u32, cache: &TemplateCache) {
    let mut off = 0;

    while let (Some(template_id), Some(field_count)) = (be_u16(body, off), be_u16(body, off + 2)) {
        off += 4;

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let (Some(raw_ie), Some(field_len)) = (be_u16(body, off), be_u16(body, off + 2))
            else {
                return;
            };
            off += 4;

            let mut enterprise = None;
            let mut ie_id = raw_ie;
            if raw_ie & 0x8000 != 0 {
                ie_id = raw_ie & 0x7FFF;
                let Some(number) = be_u32(body, off) else {
                    return;
                };
                enterprise = Some(number);
                off += 4;
            }

            fields.push(TemplateField {
                field_type: ie_id,
                field_len,
                enterprise,
            });
        }

        cache.put(exporter, obs_domain, Template { template_id, fields });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::netflow::{
        FIELD_BYTES, FIELD_DST_IPV4, FIELD_DST_PORT, FIELD_PACKETS, FIELD_PROTO, FIELD_SRC_IPV4,
        FIELD_SRC_PORT,
    };
    use std::net::Ipv4Addr;

    /// Build an IPFIX message from raw set bodies, fixing up the header
    /// length field.
    fn build_ipfix_message(sets: &[(u16, Vec<u8>)], obs_domain: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u16.to_be_bytes()); // version
        buf.extend_from_slice(&0u16.to_be_bytes()); // length (patched below)
        buf.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // export_time
        buf.extend_from_slice(&5u32.to_be_bytes()); // sequence
        buf.extend_from_slice(&obs_domain.to_be_bytes());

        for (set_id, body) in sets {
            buf.extend_from_slice(&set_id.to_be_bytes());
            buf.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
            buf.extend_from_slice(body);
        }

        let total = buf.len() as u16;
        buf[2..4].copy_from_slice(&total.to_be_bytes());
        buf
    }

    fn five_tuple_template_body(template_id: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&template_id.to_be_bytes());
        body.extend_from_slice(&7u16.to_be_bytes());
        for (ie_id, field_len) in [
            (FIELD_SRC_IPV4, 4u16),
            (FIELD_DST_IPV4, 4),
            (FIELD_SRC_PORT, 2),
            (FIELD_DST_PORT, 2),
            (FIELD_PROTO, 1),
            (FIELD_BYTES, 4),
            (FIELD_PACKETS, 4),
        ] {
            body.extend_from_slice(&ie_id.to_be_bytes());
            body.extend_from_slice(&field_len.to_be_bytes());
        }
        body
    }

    fn five_tuple_data_body(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        proto: u8,
        bytes: u32,
        packets: u32,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&src.octets());
        body.extend_from_slice(&dst.octets());
        body.extend_from_slice(&src_port.to_be_bytes());
        body.extend_from_slice(&dst_port.to_be_bytes());
        body.push(proto);
        body.extend_from_slice(&bytes.to_be_bytes());
        body.extend_from_slice(&packets.to_be_bytes());
        body
    }

    #[test]
    fn test_template_then_data() {
        let msg = build_ipfix_message(
            &[
                (2, five_tuple_template_body(256)),
                (
                    256,
                    five_tuple_data_body(
                        Ipv4Addr::new(10, 0, 0, 1),
                        Ipv4Addr::new(10, 0, 0, 2),
                        1234,
                        53,
                        17,
                        500,
                        5,
                    ),
                ),
            ],
            1,
        );

        let decoder = IpfixDecoder::new();
        let flows = decoder.decode(&msg, "192.0.2.1");
        assert_eq!(flows.len(), 1);

        let f = &flows[0];
        assert_eq!(f.src, "10.0.0.1");
        assert_eq!(f.dst, "10.0.0.2");
        assert_eq!(f.src_port, 1234);
        assert_eq!(f.dst_port, 53);
        assert_eq!(f.proto, "17");
        assert_eq!(f.bytes, 500);
        assert_eq!(f.packets, 5);
        assert_eq!(f.ts, 1_700_000_000.0);
    }

    #[test]
    fn test_data_before_template_dropped() {
        let data_only = build_ipfix_message(
            &[(
                256,
                five_tuple_data_body(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(10, 0, 0, 2),
                    1,
                    2,
                    6,
                    10,
                    1,
                ),
            )],
            1,
        );
        let template_only = build_ipfix_message(&[(2, five_tuple_template_body(256))], 1);

        let decoder = IpfixDecoder::new();
        assert!(decoder.decode(&data_only, "192.0.2.1").is_empty());
        assert!(decoder.decode(&template_only, "192.0.2.1").is_empty());
        assert_eq!(decoder.decode(&data_only, "192.0.2.1").len(), 1);
    }

    #[test]
    fn test_enterprise_field_specifier() {
        // Template: src-ipv4, dst-ipv4, and one enterprise-scoped field.
        let mut template_body = Vec::new();
        template_body.extend_from_slice(&400u16.to_be_bytes());
        template_body.extend_from_slice(&3u16.to_be_bytes());
        for (ie_id, field_len) in [(FIELD_SRC_IPV4, 4u16), (FIELD_DST_IPV4, 4)] {
            template_body.extend_from_slice(&ie_id.to_be_bytes());
            template_body.extend_from_slice(&field_len.to_be_bytes());
        }
        // Enterprise bit set on ie id 100, length 2, enterprise 9999.
        template_body.extend_from_slice(&(0x8000u16 | 100).to_be_bytes());
        template_body.extend_from_slice(&2u16.to_be_bytes());
        template_body.extend_from_slice(&9999u32.to_be_bytes());

        let mut data_body = Vec::new();
        data_body.extend_from_slice(&Ipv4Addr::new(1, 1, 1, 1).octets());
        data_body.extend_from_slice(&Ipv4Addr::new(2, 2, 2, 2).octets());
        data_body.extend_from_slice(&0xBEEFu16.to_be_bytes());

        let msg = build_ipfix_message(&[(2, template_body), (400, data_body)], 3);
        let decoder = IpfixDecoder::new();
        let flows = decoder.decode(&msg, "e");

        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].src, "1.1.1.1");
        assert_eq!(flows[0].dst, "2.2.2.2");

        let template = decoder.templates().get("e", 3, 400).expect("cached");
        assert_eq!(template.fields[2].field_type, 100);
        assert_eq!(template.fields[2].enterprise, Some(9999));
    }

    #[test]
    fn test_templates_scoped_by_observation_domain() {
        let decoder = IpfixDecoder::new();
        let template_d1 = build_ipfix_message(&[(2, five_tuple_template_body(256))], 1);
        let data_d2 = build_ipfix_message(
            &[(
                256,
                five_tuple_data_body(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(10, 0, 0, 2),
                    1,
                    2,
                    6,
                    10,
                    1,
                ),
            )],
            2,
        );

        decoder.decode(&template_d1, "192.0.2.1");
        // Same exporter, different observation domain: template miss.
        assert!(decoder.decode(&data_d2, "192.0.2.1").is_empty());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut msg = build_ipfix_message(&[(2, five_tuple_template_body(256))], 1);
        msg[1] = 9;
        assert!(IpfixDecoder::new().decode(&msg, "e").is_empty());
    }

    #[test]
    fn test_header_length_truncates_trailing_sets() {
        let msg = build_ipfix_message(
            &[
                (2, five_tuple_template_body(256)),
                (
                    256,
                    five_tuple_data_body(
                        Ipv4Addr::new(10, 0, 0, 1),
                        Ipv4Addr::new(10, 0, 0, 2),
                        1,
                        2,
                        6,
                        10,
                        1,
                    ),
                ),
            ],
            1,
        );

        // Shrink the header length so the data set falls outside the
        // message; the template still parses, the record does not.
        let mut short = msg.clone();
        let template_set_len = five_tuple_template_body(256).len() + 4;
        let claimed = (IPFIX_HEADER_LEN + template_set_len) as u16;
        short[2..4].copy_from_slice(&claimed.to_be_bytes());

        let decoder = IpfixDecoder::new();
        assert!(decoder.decode(&short, "e").is_empty());
        assert!(decoder.templates().get("e", 1, 256).is_some());
    }

    #[test]
    fn test_truncated_header() {
        assert!(IpfixDecoder::new().decode(&[0u8; 8], "e").is_empty());
    }
}
