use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::flow::now_ts;

/// Emitted when the distribution of a dimension moved further than the
/// configured L1 threshold between two analysis windows.
#[derive(Debug, Clone, Serialize)]
pub struct ShiftEvent {
    pub dimension: String,
    pub old_top: Vec<(String, f64)>,
    pub new_top: Vec<(String, f64)>,
    pub distance: f64,
    pub window_seconds: u64,
    pub ts: f64,
}

fn normalize(counts: &HashMap<String, f64>) -> HashMap<String, f64> {
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return HashMap::new();
    }
    counts.iter().map(|(k, v)| (k.clone(), v / total)).collect()
}

/// L1 distance between two distributions over the union of their keys.
/// Ranges from 0 (identical) to 2 (disjoint supports).
pub fn l1_distance(p: &HashMap<String, f64>, q: &HashMap<String, f64>) -> f64 {
    let keys: HashSet<&String> = p.keys().chain(q.keys()).collect();
    keys.into_iter()
        .map(|k| (p.get(k).copied().unwrap_or(0.0) - q.get(k).copied().unwrap_or(0.0)).abs())
        .sum()
}

fn top_k(dist: &HashMap<String, f64>, k: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = dist.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries.truncate(k);
    entries
}

/// Maintains the previous window's normalized distribution per dimension.
#[derive(Default)]
pub struct ShiftModel {
    prev: HashMap<String, HashMap<String, f64>>,
}

impl ShiftModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the current window's counts against the stored prior and
    /// rotate the prior. Below `min_total` the state is left untouched;
    /// the first qualifying window primes the prior without emitting.
    pub fn update_and_detect(
        &mut self,
        dimension: &str,
        counts: &HashMap<String, f64>,
        threshold: f64,
        min_total: f64,
        window_seconds: u64,
    ) -> Option<ShiftEvent> {
        let total: f64 = counts.values().sum();
        if total < min_total {
            return None;
        }

        let current = normalize(counts);
        let prev = self.prev.insert(dimension.to_string(), current.clone())?;

        let distance = l1_distance(&prev, &current);
        if distance >= threshold {
            return Some(ShiftEvent {
                dimension: dimension.to_string(),
                old_top: top_k(&prev, 5),
                new_top: top_k(&current, 5),
                distance,
                window_seconds,
                ts: now_ts(),
            });
        }

        None
    }
}
