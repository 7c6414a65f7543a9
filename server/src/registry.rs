//! Capability registry and factory.
//!
//! The orchestrator never knows a capability's protocol: everything is
//! either a UDP collector (start/stop/status over some decoder) or an
//! analyzer (the baseline anomaly capability). Which capabilities exist
//! in a process is decided at startup from a list of factory ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::baseline::{BaselineAnomaly, BaselineSettings};
use crate::collector::UdpCollector;
use crate::decode::ipfix::IpfixDecoder;
use crate::decode::jflow::JflowDecoder;
use crate::decode::json::JsonDecoder;
use crate::decode::netflow::NetflowDecoder;
use crate::decode::sflow::SflowDecoder;
use crate::decode::FlowDecoder;
use crate::store::FlowStore;

/// Every known factory id, in registration order.
pub const ALL_CAPABILITIES: &[&str] = &[
    "sflow_udp",
    "netflow_udp",
    "ipfix_udp",
    "jflow_udp",
    "json_udp",
    "baseline_anomaly",
];

/// A loaded capability.
pub enum Capability {
    Collector(Arc<UdpCollector>),
    Analyzer(Arc<BaselineAnomaly>),
}

impl Capability {
    pub fn name(&self) -> &str {
        match self {
            Capability::Collector(c) => c.name(),
            Capability::Analyzer(a) => a.name,
        }
    }

    pub async fn status(&self) -> serde_json::Value {
        match self {
            Capability::Collector(c) => {
                serde_json::to_value(c.status().await).unwrap_or_default()
            }
            Capability::Analyzer(a) => a.status().await,
        }
    }
}

/// Holds loaded capability instances, keyed by name.
#[derive(Default)]
pub struct CapabilityRegistry {
    caps: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability; duplicate names are rejected.
    pub fn register(&mut self, cap: Capability) -> Result<()> {
        let name = cap.name().to_string();
        if self.caps.contains_key(&name) {
            bail!("duplicate capability name {name}");
        }
        self.caps.insert(name, cap);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.caps.get(name)
    }

    /// Sorted capability names.
    pub fn list(&self) -> Vec<String> {
        self.caps.keys().cloned().collect()
    }

    /// The baseline analyzer, when loaded.
    pub fn baseline(&self) -> Option<Arc<BaselineAnomaly>> {
        self.caps.values().find_map(|cap| match cap {
            Capability::Analyzer(a) => Some(Arc::clone(a)),
            _ => None,
        })
    }
}

fn collector(
    name: &str,
    default_port: u16,
    decoder: Box<dyn FlowDecoder>,
    store: &Arc<FlowStore>,
) -> Capability {
    Capability::Collector(Arc::new(UdpCollector::new(
        name,
        "0.0.0.0",
        default_port,
        Arc::clone(store),
        decoder,
    )))
}

/// Instantiate a capability by factory id. Unknown ids are a startup
/// configuration error.
pub fn build_capability(
    id: &str,
    store: &Arc<FlowStore>,
    baseline_settings: &BaselineSettings,
) -> Result<Capability> {
    let cap = match id {
        "sflow_udp" => collector(id, 6343, Box::new(SflowDecoder::new()), store),
        "netflow_udp" => collector(id, 2055, Box::new(NetflowDecoder::new()), store),
        "ipfix_udp" => collector(id, 4739, Box::new(IpfixDecoder::new()), store),
        "jflow_udp" => collector(id, 2055, Box::new(JflowDecoder::new()), store),
        "json_udp" => collector(id, 9999, Box::new(JsonDecoder::new()), store),
        "baseline_anomaly" => Capability::Analyzer(Arc::new(BaselineAnomaly::new(
            Arc::clone(store),
            baseline_settings.clone(),
        ))),
        other => bail!(
            "unknown capability '{other}' (known: {})",
            ALL_CAPABILITIES.join(", ")
        ),
    };
    Ok(cap)
}
