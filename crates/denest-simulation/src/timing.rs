// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Virtual and wall-clock timing of sessions

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::time::Duration;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Timing of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTiming {
    pub name: String,
    /// Kernel time at session start, in ms
    pub start: f64,
    /// Kernel time at session end, in ms
    pub end: f64,
    /// Wall-clock running time; `None` until the session has run
    pub real_time_ms: Option<u64>,
}

/// Session name → `(start, end)` in run order
///
/// Serializes as `{"00_warmup": [0.0, 100.0], ...}`, keeping run order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingTable {
    entries: Vec<SessionTiming>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a planned session
    pub fn plan(&mut self, name: &str, start: f64, end: f64) {
        self.entries.push(SessionTiming {
            name: name.to_string(),
            start,
            end,
            real_time_ms: None,
        });
    }

    /// Record the wall-clock time a session took
    pub fn complete(&mut self, name: &str, real_time: Duration) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.real_time_ms = Some(whole_millis(real_time));
        }
    }

    pub fn get(&self, name: &str) -> Option<&SessionTiming> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[SessionTiming] {
        &self.entries
    }

    /// `(start, end)` pairs in run order
    pub fn intervals(&self) -> Vec<(f64, f64)> {
        self.entries.iter().map(|e| (e.start, e.end)).collect()
    }

    /// Virtual time covered by every planned session
    pub fn total_time(&self) -> f64 {
        self.entries.last().map(|e| e.end).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TimingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &(entry.start, entry.end))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_in_run_order() {
        let mut table = TimingTable::new();
        table.plan("00_b", 0.0, 10.0);
        table.plan("01_a", 10.0, 25.0);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"00_b":[0.0,10.0],"01_a":[10.0,25.0]}"#);
        assert_eq!(table.total_time(), 25.0);
    }

    #[test]
    fn test_complete_records_real_time() {
        let mut table = TimingTable::new();
        table.plan("00_warmup", 0.0, 100.0);
        assert_eq!(table.get("00_warmup").unwrap().real_time_ms, None);
        table.complete("00_warmup", Duration::from_millis(12));
        assert_eq!(table.get("00_warmup").unwrap().real_time_ms, Some(12));
    }

    #[test]
    fn test_real_time_saturates() {
        let mut table = TimingTable::new();
        table.plan("00_long", 0.0, 1.0);
        table.complete("00_long", Duration::MAX);
        assert_eq!(table.get("00_long").unwrap().real_time_ms, Some(u64::MAX));
        assert_eq!(whole_millis(Duration::from_secs(u64::MAX)), u64::MAX);
        assert_eq!(whole_millis(Duration::from_micros(2_999)), 2);
    }
}
