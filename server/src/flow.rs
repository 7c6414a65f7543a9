use serde::{Deserialize, Serialize};

/// Normalized flow record that every decoder must output.
///
/// This decouples the analyzers from protocol specifics: the monitor and
/// the baseline capability only ever see `FlowRecord`s, never raw packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Unix time in seconds when the flow was observed or received.
    pub ts: f64,
    /// Source IP address, textual.
    pub src: String,
    /// Destination IP address, textual.
    pub dst: String,
    /// Transport-layer ports, 0 if unknown.
    #[serde(default)]
    pub src_port: u16,
    #[serde(default)]
    pub dst_port: u16,
    /// Protocol string such as "TCP", "UDP", or the protocol number.
    pub proto: String,
    /// Latency in milliseconds; 0.0 when the protocol cannot infer one.
    pub latency_ms: f64,
    /// Optional counters for triage.
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub packets: u64,
    /// IP of the exporting device, stamped by the collector from the
    /// socket peer address. Decoders leave this unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<String>,
}

impl FlowRecord {
    /// Group key used by the latency monitor. A 5-tuple identifier.
    pub fn key(&self) -> String {
        format!(
            "{}:{}->{}:{}/{}",
            self.src, self.src_port, self.dst, self.dst_port, self.proto
        )
    }
}

/// Current wall-clock time as fractional Unix seconds.
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
