//! JSON test channel decoder.
//!
//! A practical testing capability: validates collector wiring, store
//! ingestion, and analysis without any binary protocol. The payload is a
//! single JSON object or an array of objects; each object needs `src`,
//! `dst`, and `latency_ms`, everything else has defaults.

use serde::Deserialize;

use crate::decode::FlowDecoder;
use crate::flow::{now_ts, FlowRecord};

#[derive(Debug, Deserialize)]
struct JsonFlow {
    src: String,
    dst: String,
    latency_ms: f64,
    ts: Option<f64>,
    #[serde(default)]
    src_port: u16,
    #[serde(default)]
    dst_port: u16,
    proto: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    packets: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPayload {
    One(JsonFlow),
    Many(Vec<JsonFlow>),
}

impl JsonFlow {
    fn into_record(self) -> Option<FlowRecord> {
        if self.src.is_empty() || self.dst.is_empty() || self.latency_ms < 0.0 {
            return None;
        }
        Some(FlowRecord {
            ts: self.ts.unwrap_or_else(now_ts),
            src: self.src,
            dst: self.dst,
            src_port: self.src_port,
            dst_port: self.dst_port,
            proto: self.proto.unwrap_or_else(|| "TCP".to_string()),
            latency_ms: self.latency_ms,
            bytes: self.bytes,
            packets: self.packets,
            exporter: None,
        })
    }
}

#[derive(Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FlowDecoder for JsonDecoder {
    fn decode(&self, data: &[u8], _exporter: &str) -> Vec<FlowRecord> {
        decode_json(data)
    }
}

/// Decode a JSON payload. Invalid JSON or objects missing required
/// fields yield nothing, which the collector counts as dropped.
pub fn decode_json(data: &[u8]) -> Vec<FlowRecord> {
    let Ok(payload) = serde_json::from_slice::<JsonPayload>(data) else {
        return Vec::new();
    };

    match payload {
        JsonPayload::One(flow) => flow.into_record().into_iter().collect(),
        JsonPayload::Many(flows) => flows.into_iter().filter_map(JsonFlow::into_record).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object() {
        let payload = br#"{"src": "10.0.0.1", "dst": "10.0.0.2", "latency_ms": 42.5}"#;
        let flows = decode_json(payload);

        assert_eq!(flows.len(), 1);
        let f = &flows[0];
        assert_eq!(f.src, "10.0.0.1");
        assert_eq!(f.dst, "10.0.0.2");
        assert_eq!(f.latency_ms, 42.5);
        // Defaults.
        assert_eq!(f.src_port, 0);
        assert_eq!(f.dst_port, 0);
        assert_eq!(f.proto, "TCP");
        assert_eq!(f.bytes, 0);
        assert_eq!(f.packets, 0);
        assert!(f.ts > 0.0);
    }

    #[test]
    fn test_array_of_objects() {
        let payload = br#"[
            {"src": "10.0.0.1", "dst": "10.0.0.2", "latency_ms": 1.0},
            {"src": "10.0.0.3", "dst": "10.0.0.4", "latency_ms": 2.0,
             "src_port": 1234, "dst_port": 53, "proto": "UDP",
             "bytes": 100, "packets": 2, "ts": 1700000000.0}
        ]"#;
        let flows = decode_json(payload);

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[1].proto, "UDP");
        assert_eq!(flows[1].dst_port, 53);
        assert_eq!(flows[1].ts, 1_700_000_000.0);
    }

    #[test]
    fn test_invalid_json_yields_empty() {
        assert!(decode_json(b"not json at all").is_empty());
        assert!(decode_json(b"").is_empty());
    }

    #[test]
    fn test_missing_required_fields_yield_empty() {
        assert!(decode_json(br#"{"src": "10.0.0.1", "dst": "10.0.0.2"}"#).is_empty());
        assert!(decode_json(br#"{"src": "10.0.0.1", "latency_ms": 5.0}"#).is_empty());
    }

    #[test]
    fn test_negative_latency_rejected() {
        let payload = br#"{"src": "10.0.0.1", "dst": "10.0.0.2", "latency_ms": -1.0}"#;
        assert!(decode_json(payload).is_empty());
    }

    #[test]
    fn test_empty_addresses_rejected() {
        let payload = br#"{"src": "", "dst": "10.0.0.2", "latency_ms": 1.0}"#;
        assert!(decode_json(payload).is_empty());
    }

    #[test]
    fn test_array_keeps_valid_entries() {
        // One bad entry must not sink the others.
        let payload = br#"[
            {"src": "10.0.0.1", "dst": "10.0.0.2", "latency_ms": 1.0},
            {"src": "", "dst": "10.0.0.4", "latency_ms": 2.0}
        ]"#;
        let flows = decode_json(payload);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].src, "10.0.0.1");
    }
}
