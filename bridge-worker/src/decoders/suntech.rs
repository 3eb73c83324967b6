//! Suntech (§4.2.7): ASCII semicolon-delimited. `ST300…`/`ST4300…`.

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

/// Numeric message-type → named command catalog (§4.2.7). Only the
/// location-bearing commands matter to the canonical envelope; others
/// still decode but keep the synthesized name as `EventCode.Name`.
fn command_name(message_type: i64) -> &'static str {
    match message_type {
        0 => "STT",
        1 => "ALT",
        2 => "UEX",
        3 => "IDX",
        4 => "OBD",
        _ => "UNK",
    }
}

pub fn decode(line: &str) -> Result<DecodedFrame, DecodeError> {
    let line = line.trim();
    if !(line.starts_with("ST300") || line.starts_with("ST4300")) {
        return Err(DecodeError::BadSentinel { expected: "ST300/ST4300" });
    }
    let parts: Vec<&str> = line.split(';').collect();
    if parts.len() < 9 {
        return Err(DecodeError::TooShort { got: parts.len(), need: 9 });
    }

    let imei = parts[1].to_string();
    let message_type = parts[2].parse::<i64>().unwrap_or(0);
    let mut fields = FieldMap::new();

    if let Some(dt) = codec::datetime::parse(parts[3]) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }
    if let Ok(lat) = parts[4].parse::<f64>() {
        fields.insert("Latitude".to_string(), json!(lat));
    }
    if let Ok(lon) = parts[5].parse::<f64>() {
        fields.insert("Longitude".to_string(), json!(lon));
    }
    if let Ok(speed) = parts[6].parse::<f64>() {
        fields.insert("Speed".to_string(), json!(speed.round() as i64));
    }
    if let Ok(heading) = parts[7].parse::<i64>() {
        fields.insert("Direction".to_string(), json!(heading));
    }
    if let Ok(sats) = parts[8].parse::<i64>() {
        fields.insert("NumberOfSatellites".to_string(), json!(sats));
    }
    // Trailing optional fields (§4.2.7): HDOP, altitude, ignition,
    // battery, odometer, input/output status u32 — absent ones simply
    // leave the zero-value already implied by the record's defaults.
    if let Some(hdop) = parts.get(9).and_then(|s| s.parse::<f64>().ok()) {
        fields.insert("HDOP".to_string(), json!(hdop));
    }
    if let Some(altitude) = parts.get(10).and_then(|s| s.parse::<i64>().ok()) {
        fields.insert("Altitude".to_string(), json!(altitude));
    }
    if let Some(ignition) = parts.get(11).and_then(|s| s.parse::<i64>().ok()) {
        fields.insert("IgnitionOn".to_string(), json!(ignition != 0));
    }
    if let Some(mileage) = parts.get(13).and_then(|s| s.parse::<i64>().ok()) {
        fields.insert("Mileage".to_string(), json!(mileage));
    }

    fields.insert(
        "EventCode".to_string(),
        json!({"Code": 35, "Name": command_name(message_type)}),
    );
    fields.insert("PositioningStatus".to_string(), json!("A"));

    let record = IntermediateRecord::single(imei, line, fields);
    Ok(DecodedFrame::record_only(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn st300_location_decodes_positional_fields() {
        let line = "ST300;864507035846483;0;20250613091038;18.950273;-97.922888;45;90;8;1.2;2200;1";
        let decoded = decode(line).unwrap();
        let record = decoded.record.unwrap();
        assert_eq!(record.imei.as_deref(), Some("864507035846483"));
        assert_eq!(record.top_level.get("Speed").unwrap().as_i64(), Some(45));
        assert_eq!(record.top_level.get("NumberOfSatellites").unwrap().as_i64(), Some(8));
        assert_eq!(record.top_level.get("IgnitionOn").unwrap(), true);
    }

    #[test]
    fn unrecognized_header_is_rejected() {
        assert!(decode("XX300;1;2").is_err());
    }
}
