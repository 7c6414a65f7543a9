use std::collections::HashMap;

use crate::flow::now_ts;

/// Deduplicates alerts by key for a cooldown interval.
///
/// A continuously bad flow should produce one alert per cooldown interval,
/// not one per monitor pass.
pub struct AlertDeduper {
    pub cooldown_seconds: u64,
    last_alert_ts: HashMap<String, f64>,
}

impl AlertDeduper {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown_seconds,
            last_alert_ts: HashMap::new(),
        }
    }

    /// True means emit an alert now; false means suppress due to cooldown.
    pub fn should_alert(&mut self, key: &str) -> bool {
        let now = now_ts();

        match self.last_alert_ts.get(key) {
            None => {
                self.last_alert_ts.insert(key.to_string(), now);
                true
            }
            Some(&last) if now - last >= self.cooldown_seconds as f64 => {
                self.last_alert_ts.insert(key.to_string(), now);
                true
            }
            Some(_) => false,
        }
    }
}
