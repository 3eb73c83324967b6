//! # cache
//!
//! The Device Data Cache (C4): process-wide IMEI → last-known telemetry,
//! fusing heartbeat voltage/GSM readings into later location packets that
//! don't carry them. No TTL — entries live for the process lifetime, same
//! as the Session Table.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jono_types::record::FieldMap;

#[derive(Debug, Clone, Default)]
pub struct CachedTelemetry {
    pub voltage_value: Option<i64>,
    pub gsm_signal: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_location_record: Option<FieldMap>,
}

#[derive(Debug, Default)]
pub struct DeviceCache {
    entries: DashMap<String, CachedTelemetry>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Applied by any heartbeat/status decode, and by a successful
    /// location decode whose frame carries nonzero voltage/GSM — a
    /// location with no telemetry of its own must not stomp the cache
    /// with nulls (§4.4).
    pub fn update(&self, imei: &str, voltage_value: Option<i64>, gsm_signal: Option<i64>, now: DateTime<Utc>) {
        let mut entry = self.entries.entry(imei.to_string()).or_default();
        if voltage_value.is_some() {
            entry.voltage_value = voltage_value;
        }
        if gsm_signal.is_some() {
            entry.gsm_signal = gsm_signal;
        }
        entry.last_updated = Some(now);
    }

    pub fn record_location(&self, imei: &str, record: FieldMap, now: DateTime<Utc>) {
        let mut entry = self.entries.entry(imei.to_string()).or_default();
        entry.last_location_record = Some(record);
        entry.last_updated = Some(now);
    }

    /// Reads the cached voltage for `imei`, hex-encoded uppercase, for use
    /// as `AnalogInputs.AD4` when the incoming frame has no voltage of its
    /// own (§4.4, §4.5).
    pub fn voltage_hex(&self, imei: &str) -> Option<String> {
        self.entries.get(imei).and_then(|entry| entry.voltage_value).map(|v| format!("{v:X}"))
    }

    pub fn gsm_signal(&self, imei: &str) -> Option<i64> {
        self.entries.get(imei).and_then(|entry| entry.gsm_signal)
    }

    pub fn get(&self, imei: &str) -> Option<CachedTelemetry> {
        self.entries.get(imei).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap()
    }

    #[test]
    fn heartbeat_then_location_cache_fusion_matches_walkthrough() {
        let cache = DeviceCache::new();
        cache.update("864507035846483", Some(2048), Some(3), now());
        assert_eq!(cache.voltage_hex("864507035846483").as_deref(), Some("800"));
    }

    #[test]
    fn update_with_none_preserves_prior_values() {
        let cache = DeviceCache::new();
        cache.update("X", Some(2048), Some(3), now());
        cache.update("X", None, None, now());
        assert_eq!(cache.voltage_hex("X").as_deref(), Some("800"));
        assert_eq!(cache.gsm_signal("X"), Some(3));
    }

    #[test]
    fn cache_miss_returns_none_never_fails() {
        let cache = DeviceCache::new();
        assert_eq!(cache.voltage_hex("unknown"), None);
    }
}
