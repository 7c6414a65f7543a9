//! Juniper jFlow decoder.
//!
//! jFlow is Juniper branding for flow export and is NetFlow v9
//! compatible on the wire, so this delegates to the v9 path. It stays a
//! separate decoder with its own template cache so Juniper-specific
//! field mappings and exporter quirks can diverge without touching the
//! NetFlow family.

use crate::decode::netflow::NetflowDecoder;
use crate::decode::FlowDecoder;
use crate::flow::FlowRecord;

#[derive(Default)]
pub struct JflowDecoder {
    inner: NetflowDecoder,
}

impl JflowDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowDecoder for JflowDecoder {
    fn decode(&self, data: &[u8], exporter: &str) -> Vec<FlowRecord> {
        self.inner.decode(data, exporter)
    }
}
