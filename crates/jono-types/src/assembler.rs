//! Pure canonicalization rules (§4.5), with no cache or broker access.
//!
//! [`build_packet`] takes one decoder field map plus whatever the caller
//! already resolved from the Device Data Cache (a voltage-derived `AD4`
//! hex string) and produces one canonical [`Packet`]. [`build_envelope`]
//! wraps the whole [`IntermediateRecord`] into a [`JonoEnvelope`], keying
//! packets `Packet1`, `Packet2`, ... in wire order. Cache reads/writes
//! themselves are the bridge worker's job, not this module's — see the
//! `assembler` module there for the cache-aware wrapper around this one.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::event_codes::{self, ResolutionInputs};
use crate::numeric;
use crate::packet::{
    AdditionalAlertInfoAdasDms, AnalogInputs, BaseStationInfo, BluetoothBeacon, CameraStatus,
    CurrentNetworkInfo, FatigueDrivingInformation, InputPortStatus, IoPortStatus,
    OutputPortStatus, Packet, SystemFlag, TemperatureAndHumiditySensor, TemperatureSensor,
};
use crate::record::{FieldMap, IntermediateRecord};
use crate::JonoEnvelope;

fn str_field(fields: &FieldMap, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(v) if !v.is_null() => Some(v.to_string()),
        _ => None,
    }
}

/// Deserializes a nested sub-object field (e.g. `"BaseStationInfo": {...}`)
/// when the decoder already produced one in canonical shape. Decoders that
/// instead hand the assembler flat top-level fields never populate these
/// keys, and the sub-object stays `None` — that's a documented gap, not a
/// bug, since only Meitrack/Huabao currently emit these richer fields. A
/// decoder that only fills part of the object (e.g. `AD1`-`AD5` of
/// `AnalogInputs`' ten slots) still deserializes cleanly: every sub-object
/// struct in `packet.rs` carries `#[serde(default)]` so missing keys fall
/// back to that struct's `Default` rather than failing the whole object.
fn sub_object<T: serde::de::DeserializeOwned>(fields: &FieldMap, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn parse_datetime(fields: &FieldMap) -> Option<DateTime<Utc>> {
    match fields.get("Datetime") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Resolves `AD4` per §4.4: emit from an explicit `VoltageValue` when the
/// decoder has one, else fall back to `cached_ad4_hex` (already looked up
/// by the caller from the Device Data Cache), else null.
fn resolve_ad4(fields: &FieldMap, cached_ad4_hex: Option<&str>) -> Option<String> {
    if let Some(voltage) = numeric::to_i64(fields.get("VoltageValue")) {
        return Some(format!("{voltage:X}"));
    }
    cached_ad4_hex.map(|s| s.to_string())
}

fn resolve_event_code(fields: &FieldMap) -> crate::packet::EventCode {
    // A decoder that already resolved both halves of the pair (its own
    // private code-translation table, §3 "Event-Code Catalog", ran ahead
    // of assembly) hands the assembler a `{Code, Name}` object directly —
    // that name is authoritative and is not re-looked-up against the
    // shared catalog, since a protocol's private table may legitimately
    // disagree with the catalog's name for the same numeric code.
    if let Some(resolved) = sub_object::<crate::packet::EventCode>(fields, "EventCode") {
        return resolved;
    }

    let explicit_code = numeric::to_i64(fields.get("EventCode")).map(|c| c as i32);
    let alarm_and_language_code = fields
        .get("AlarmAndLanguage")
        .and_then(|v| v.get("EventCode"))
        .and_then(numeric::to_i64)
        .map(|c| c as i32);
    let alarm_type = fields.get("AlarmType").and_then(Value::as_str);
    let message = fields.get("Message").and_then(Value::as_str);
    let terminal_info = fields
        .get("terminalInformationContent")
        .or_else(|| fields.get("TerminalInfo"))
        .and_then(Value::as_str);

    event_codes::resolve(&ResolutionInputs {
        explicit_code,
        alarm_and_language_code,
        alarm_type,
        message,
        terminal_info,
    })
}

fn build_analog_inputs(fields: &FieldMap, cached_ad4_hex: Option<&str>) -> AnalogInputs {
    if let Some(mut inputs) = sub_object::<AnalogInputs>(fields, "AnalogInputs") {
        if inputs.ad4.is_none() {
            inputs.ad4 = resolve_ad4(fields, cached_ad4_hex);
        }
        return inputs;
    }
    AnalogInputs {
        ad1: str_field(fields, "AD1"),
        ad2: str_field(fields, "AD2"),
        ad3: str_field(fields, "AD3"),
        ad4: resolve_ad4(fields, cached_ad4_hex),
        ad5: str_field(fields, "AD5"),
        ad6: str_field(fields, "AD6"),
        ad7: str_field(fields, "AD7"),
        ad8: str_field(fields, "AD8"),
        ad9: str_field(fields, "AD9"),
        ad10: str_field(fields, "AD10"),
    }
}

fn build_io_port_status(fields: &FieldMap) -> IoPortStatus {
    sub_object(fields, "IoPortStatus").unwrap_or_default()
}

/// Builds one canonical [`Packet`] from one decoder field map.
///
/// `cached_ad4_hex` is the Device Data Cache's voltage-derived `AD4`
/// value for this IMEI, already resolved by the caller; `None` when there
/// is no cache or no entry yet.
pub fn build_packet(fields: &FieldMap, cached_ad4_hex: Option<&str>) -> Packet {
    let gsm_internal = numeric::to_i64(IntermediateRecord::gsm_signal_strength(fields));

    Packet {
        altitude: numeric::to_i64(fields.get("Altitude")),
        datetime: parse_datetime(fields),
        event_code: resolve_event_code(fields),
        latitude: numeric::to_f64(fields.get("Latitude")),
        longitude: numeric::to_f64(fields.get("Longitude")),
        speed: numeric::to_i64(fields.get("Speed")),
        run_time: numeric::to_i64(fields.get("RunTime")),
        fuel_percentage: numeric::to_i64(fields.get("FuelPercentage")),
        direction: numeric::to_i64(fields.get("Direction")),
        hdop: numeric::to_f64(fields.get("HDOP")),
        mileage: numeric::to_i64(fields.get("Mileage")),
        positioning_status: numeric::to_positioning_status(fields.get("PositioningStatus")),
        number_of_satellites: numeric::to_i64(fields.get("NumberOfSatellites")),
        gsm_signal_strength: gsm_internal.map(numeric::gsm_internal_to_wire),
        analog_inputs: build_analog_inputs(fields, cached_ad4_hex),
        io_port_status: build_io_port_status(fields),
        base_station_info: sub_object::<BaseStationInfo>(fields, "BaseStationInfo"),
        output_port_status: sub_object::<OutputPortStatus>(fields, "OutputPortStatus").unwrap_or_default(),
        input_port_status: sub_object::<InputPortStatus>(fields, "InputPortStatus").unwrap_or_default(),
        system_flag: sub_object::<SystemFlag>(fields, "SystemFlag"),
        temperature_sensor: sub_object::<TemperatureSensor>(fields, "TemperatureSensor"),
        camera_status: sub_object::<CameraStatus>(fields, "CameraStatus"),
        current_network_info: sub_object::<CurrentNetworkInfo>(fields, "CurrentNetworkInfo"),
        fatigue_driving_information: sub_object::<FatigueDrivingInformation>(fields, "FatigueDrivingInformation"),
        additional_alert_info_adas_dms: sub_object::<AdditionalAlertInfoAdasDms>(fields, "AdditionalAlertInfoADASDMS"),
        bluetooth_beacon_a: sub_object::<BluetoothBeacon>(fields, "BluetoothBeaconA"),
        bluetooth_beacon_b: sub_object::<BluetoothBeacon>(fields, "BluetoothBeaconB"),
        temperature_and_humidity_sensor: sub_object::<TemperatureAndHumiditySensor>(fields, "TemperatureAndHumiditySensor"),
    }
}

/// Assembles a full [`JonoEnvelope`] from an [`IntermediateRecord`],
/// iterating its packets in wire order (§4.5 rule i).
///
/// `cached_ad4_hex` is looked up once per IMEI by the caller and applied
/// uniformly to every packet in the record — a single frame never spans
/// more than one device.
pub fn build_envelope(record: &IntermediateRecord, cached_ad4_hex: Option<&str>) -> JonoEnvelope {
    let packets: Vec<Packet> = record
        .packets()
        .into_iter()
        .map(|fields| build_packet(fields, cached_ad4_hex))
        .collect();
    JonoEnvelope::new(record.imei.clone().unwrap_or_default(), record.message.clone(), packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meitrack_aaa_fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("Latitude".to_string(), json!(18.950273));
        fields.insert("Longitude".to_string(), json!(-97.922888));
        fields.insert("Datetime".to_string(), json!("2024-12-05T12:04:05Z"));
        fields.insert("Altitude".to_string(), json!(2217));
        fields.insert("Speed".to_string(), json!(0));
        fields.insert("Direction".to_string(), json!(69));
        fields.insert("EventCode".to_string(), json!(1));
        fields.insert(
            "BaseStationInfo".to_string(),
            json!({"MCC": "334", "MNC": "3", "LAC": "7663", "CellID": "00AA7FAB"}),
        );
        fields.insert("Mileage".to_string(), json!(358868041));
        fields
    }

    #[test]
    fn meitrack_aaa_example_resolves_per_spec_walkthrough() {
        let packet = build_packet(&meitrack_aaa_fields(), None);
        assert_eq!(packet.latitude, Some(18.950273));
        assert_eq!(packet.longitude, Some(-97.922888));
        assert_eq!(packet.altitude, Some(2217));
        assert_eq!(packet.speed, Some(0));
        assert_eq!(packet.direction, Some(69));
        assert_eq!(packet.event_code.code, 1);
        assert_eq!(packet.mileage, Some(358868041));
        assert_eq!(packet.base_station_info.as_ref().unwrap().mcc.as_deref(), Some("334"));
        assert_eq!(packet.base_station_info.as_ref().unwrap().cell_id.as_deref(), Some("00AA7FAB"));
    }

    #[test]
    fn missing_voltage_falls_back_to_cached_ad4() {
        let fields = FieldMap::new();
        let packet = build_packet(&fields, Some("2A"));
        assert_eq!(packet.analog_inputs.ad4.as_deref(), Some("2A"));
    }

    #[test]
    fn explicit_voltage_value_wins_over_cache() {
        let mut fields = FieldMap::new();
        fields.insert("VoltageValue".to_string(), json!(58));
        let packet = build_packet(&fields, Some("2A"));
        assert_eq!(packet.analog_inputs.ad4.as_deref(), Some("3A"));
    }

    #[test]
    fn build_envelope_keys_packets_in_order_and_preserves_message() {
        let record = IntermediateRecord::multi("869436050102345", "$$raw", vec![meitrack_aaa_fields(), FieldMap::new()]);
        let envelope = build_envelope(&record, None);
        assert_eq!(envelope.imei, "869436050102345");
        assert_eq!(envelope.message.as_deref(), Some("$$raw"));
        assert_eq!(envelope.data_packets, 2);
        assert!(envelope.list_packets.contains_key("Packet1"));
        assert!(envelope.list_packets.contains_key("Packet2"));
    }
}
