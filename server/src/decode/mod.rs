//! Wire decoders: bytes in, normalized [`FlowRecord`]s out.
//!
//! Decoders never fail the process. Truncated headers, bad versions,
//! out-of-range lengths, missing templates, and unsupported field widths
//! all degrade to an empty result (the collector counts the datagram as
//! dropped) or to a skipped field/record.

use crate::flow::FlowRecord;

pub mod ipfix;
pub mod jflow;
pub mod json;
pub mod netflow;
pub mod sflow;
pub mod template;

/// A decoder turns one datagram into zero or more records.
///
/// `exporter` is the sender identity (peer IP) used to scope template
/// caches; stateless decoders ignore it.
pub trait FlowDecoder: Send + Sync {
    fn decode(&self, data: &[u8], exporter: &str) -> Vec<FlowRecord>;
}

/// Bounds-checked big-endian readers shared by the binary decoders.
pub(crate) fn be_u16(buf: &[u8], off: usize) -> Option<u16> {
    let bytes = buf.get(off..off + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_u64(buf: &[u8], off: usize) -> Option<u64> {
    let bytes = buf.get(off..off + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_be_bytes(raw))
}
