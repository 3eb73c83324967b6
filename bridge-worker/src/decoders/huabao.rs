//! Huabao (§4.2.2): an ASCII DVR-alarm variant and a generic key:value
//! form. Both are line-oriented, `#`-terminated for the DVR form.

use chrono::Utc;
use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

/// DMS coordinate assembly shared by both lon/lat fields: sign carried by
/// the degrees field, rounded to 6 decimals (§4.1).
fn dms(deg: &str, min: &str, sec: &str) -> Option<f64> {
    let deg: i32 = deg.trim().parse().ok()?;
    let min: u32 = min.trim().parse().ok()?;
    let sec_e7: u32 = sec.trim().parse::<f64>().ok().map(|s| (s * 1e7) as u32)?;
    Some(codec::coords::dms_huabao(deg, min, sec_e7))
}

/// §4.2.2 DVR form event translation: `V201`/`V251` are the panic-alarm
/// tags; every other `V…` tag is a normal location report whose original
/// string is preserved as the event `Name`.
fn dvr_event(tag: &str) -> (i32, String) {
    match tag {
        "V201" | "V251" => (1, "Panic/Alarm".to_string()),
        other => (35, other.to_string()),
    }
}

/// `$$<len>,<family>,<event>,<IMEI>,,<datetime>,<alarm>,<lonDeg>,<lonMin>,
/// <lonSec>,<latDeg>,<latMin>,<latSec>,<speed>,<heading*100>,<ioStatus>,
/// <a1>,<a2>,...#`
pub fn decode_dvr(line: &str) -> Result<IntermediateRecord, DecodeError> {
    let line = line.trim_end_matches('#');
    let body = line.trim_start_matches("$$");
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < 15 {
        return Err(DecodeError::TooShort { got: parts.len(), need: 15 });
    }
    let event_tag = parts[2];
    let imei = parts[3].to_string();
    let datetime_raw = parts[5];
    let lon_deg = parts[7];
    let lon_min = parts[8];
    let lon_sec = parts[9];
    let lat_deg = parts[10];
    let lat_min = parts[11];
    let lat_sec = parts[12];
    let speed = parts.get(13).copied().unwrap_or("0");
    let heading_raw = parts.get(14).copied().unwrap_or("0");

    let mut fields = FieldMap::new();
    let (code, name) = dvr_event(event_tag);
    fields.insert("EventCode".to_string(), json!({"Code": code, "Name": name}));
    if let Some(dt) = codec::datetime::parse(datetime_raw) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }
    if let Some(lon) = dms(lon_deg, lon_min, lon_sec) {
        fields.insert("Longitude".to_string(), json!(lon));
    }
    if let Some(lat) = dms(lat_deg, lat_min, lat_sec) {
        fields.insert("Latitude".to_string(), json!(lat));
    }
    if let Ok(speed) = speed.parse::<f64>() {
        fields.insert("Speed".to_string(), json!(speed.round() as i64));
    }
    if let Ok(heading_raw) = heading_raw.parse::<f64>() {
        fields.insert("Direction".to_string(), json!((heading_raw / 100.0).round() as i64));
    }
    fields.insert("PositioningStatus".to_string(), json!("A"));

    Ok(IntermediateRecord::single(imei, line, fields))
}

/// Generic form: scans `key:value` pairs case-insensitively for `IMEI`,
/// `lat*`, `lon*`, `speed`, `heading`/`direction`. Defaults the timestamp
/// to now (with positioning "A") when no timestamp key is present at all
/// — the generic form often omits one entirely (§4.2.2).
pub fn decode_generic(line: &str) -> Result<IntermediateRecord, DecodeError> {
    let mut imei = None;
    let mut fields = FieldMap::new();
    let mut saw_timestamp = false;

    for pair in line.split(|c: char| c == ',' || c == ';') {
        let Some((key, value)) = pair.split_once(':') else { continue };
        let key_lower = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key_lower.as_str() {
            "imei" => imei = Some(value.to_string()),
            k if k.starts_with("lat") => {
                if let Ok(lat) = value.parse::<f64>() {
                    fields.insert("Latitude".to_string(), json!(lat));
                }
            }
            k if k.starts_with("lon") => {
                if let Ok(lon) = value.parse::<f64>() {
                    fields.insert("Longitude".to_string(), json!(lon));
                }
            }
            "speed" => {
                if let Ok(speed) = value.parse::<i64>() {
                    fields.insert("Speed".to_string(), json!(speed));
                }
            }
            "heading" | "direction" => {
                if let Ok(direction) = value.parse::<i64>() {
                    fields.insert("Direction".to_string(), json!(direction));
                }
            }
            "datetime" | "time" | "timestamp" => {
                if let Some(dt) = codec::datetime::parse(value) {
                    fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
                    saw_timestamp = true;
                }
            }
            _ => {}
        }
    }

    let imei = imei.ok_or(DecodeError::MalformedField("generic Huabao frame has no IMEI: field".into()))?;
    if !saw_timestamp {
        fields.insert("Datetime".to_string(), json!(Utc::now().to_rfc3339()));
    }
    fields.insert("PositioningStatus".to_string(), json!("A"));
    Ok(IntermediateRecord::single(imei, line, fields))
}

/// `$$`-prefixed lines are the DVR alarm form; anything else falls to the
/// generic key:value scan (§4.2.2).
pub fn decode(line: &str) -> Result<DecodedFrame, DecodeError> {
    let record = if line.trim_start().starts_with("$$") {
        decode_dvr(line)?
    } else {
        decode_generic(line)?
    };
    Ok(DecodedFrame::record_only(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dvr_v201_resolves_panic_alarm_per_spec_scenario() {
        let line = "$$dc0174,30,V201,0370703,,250613091038,1,78,0,0,12,0,0,12.00,7800,0#";
        let record = decode_dvr(line).unwrap();
        let fields = &record.top_level;
        let event = fields.get("EventCode").unwrap();
        assert_eq!(event["Code"], 1);
        assert_eq!(event["Name"], "Panic/Alarm");
        assert_eq!(fields.get("Speed").unwrap().as_i64(), Some(12));
        assert_eq!(fields.get("Direction").unwrap().as_i64(), Some(78));
        assert_eq!(fields.get("Datetime").unwrap().as_str().unwrap(), "2025-06-13T09:10:38+00:00");
    }

    #[test]
    fn generic_form_defaults_timestamp_and_positioning_when_absent() {
        let line = "IMEI:864507035846483,lat:18.95,lon:-97.92,speed:10,heading:90";
        let record = decode_generic(line).unwrap();
        assert_eq!(record.imei.as_deref(), Some("864507035846483"));
        assert_eq!(record.top_level.get("PositioningStatus").unwrap(), "A");
        assert!(record.top_level.contains_key("Datetime"));
    }

    #[test]
    fn generic_form_without_imei_is_an_error() {
        assert!(decode_generic("lat:18.95,lon:-97.92").is_err());
    }
}
