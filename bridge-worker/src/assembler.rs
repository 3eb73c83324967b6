//! # assembler
//!
//! Cache-aware wrapper around [`jono_types::assembler`]. The pure
//! canonicalization rules live in `jono-types` with no I/O; this module's
//! only job is resolving the Device Data Cache lookup (§4.4's `AD4`
//! fallback) once per record and threading it through, then writing the
//! record's own voltage/GSM/location fields back into the cache so the
//! *next* frame for this IMEI can fall back to them.

use chrono::Utc;
use jono_types::numeric;
use jono_types::record::IntermediateRecord;
use jono_types::JonoEnvelope;

use crate::cache::DeviceCache;

/// Builds the envelope for `record`, consulting and updating `cache` for
/// the IMEI it carries. Frames with no IMEI (shouldn't normally reach
/// here — see [`crate::decoders::FrameCapabilities`]) still assemble,
/// just without a cache fallback.
pub fn assemble(record: &IntermediateRecord, cache: &DeviceCache) -> JonoEnvelope {
    let imei = record.imei.as_deref().unwrap_or_default();
    let cached_ad4_hex = cache.voltage_hex(imei);

    let envelope = jono_types::assembler::build_envelope(record, cached_ad4_hex.as_deref());

    if !imei.is_empty() {
        update_cache(imei, record, cache);
    }

    envelope
}

fn update_cache(imei: &str, record: &IntermediateRecord, cache: &DeviceCache) {
    let now = Utc::now();
    for fields in record.packets() {
        let voltage = numeric::to_i64(fields.get("VoltageValue"));
        let gsm = numeric::to_i64(IntermediateRecord::gsm_signal_strength(fields));
        if voltage.is_some() || gsm.is_some() {
            cache.update(imei, voltage, gsm, now);
        }
        if fields.contains_key("Latitude") || fields.contains_key("Longitude") {
            cache.record_location(imei, fields.clone(), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jono_types::record::FieldMap;
    use serde_json::json;

    #[test]
    fn heartbeat_voltage_feeds_later_location_ad4() {
        let cache = DeviceCache::new();

        let mut heartbeat_fields = FieldMap::new();
        heartbeat_fields.insert("VoltageValue".to_string(), json!(2048));
        let heartbeat = IntermediateRecord::single("864507035846483", "heartbeat", heartbeat_fields);
        assemble(&heartbeat, &cache);

        let mut location_fields = FieldMap::new();
        location_fields.insert("Latitude".to_string(), json!(18.950273));
        let location = IntermediateRecord::single("864507035846483", "location", location_fields);
        let envelope = assemble(&location, &cache);

        let packet = envelope.list_packets.get("Packet1").unwrap();
        assert_eq!(packet.analog_inputs.ad4.as_deref(), Some("800"));
    }

    #[test]
    fn record_with_no_imei_still_assembles() {
        let record = IntermediateRecord::single("", "raw", FieldMap::new());
        let cache = DeviceCache::new();
        let envelope = assemble(&record, &cache);
        assert!(!envelope.is_well_formed());
    }
}
