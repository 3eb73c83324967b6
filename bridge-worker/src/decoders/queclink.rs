//! Queclink (§4.2.6): ASCII comma-delimited `+RESP:`/`+BUFF:` frames.
//! `+RESP:GTFRI,350302,0123456789012345,...`

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

/// Device family discriminated by the first two characters of the
/// protocol-version field (§4.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Gl300,
    Gl320,
    Gl350,
}

fn family_for_version(version_field: &str) -> Option<Family> {
    match version_field.get(0..2)? {
        "30" => Some(Family::Gl300),
        "32" => Some(Family::Gl320),
        "35" => Some(Family::Gl350),
        _ => None,
    }
}

/// Family-specific command+report-type → event code table (§4.2.6).
/// `GTSPD` report-type 1 is the documented "Speeding" example; the rest
/// follow the same numbering convention the catalog already uses.
fn event_for_command(command: &str, report_type: Option<i64>) -> (i32, &'static str) {
    match (command, report_type) {
        ("GTFRI", _) => (35, "Normal Location"),
        ("GTIGL", _) => (35, "Ignition On/Off Location"),
        ("GTSPD", Some(1)) => (3, "Speeding"),
        ("GTSPD", _) => (35, "Speed Report"),
        ("GTSOS", _) => (1, "SOS"),
        ("GTRTL", _) => (35, "Real-time Location"),
        ("GTDOG", _) => (35, "Watchdog Reset"),
        ("GTGEO", _) => (20, "Fence In Alarm"),
        ("GTTEM", _) => (35, "Temperature Report"),
        ("GTVGL", _) => (35, "VIP Location"),
        ("GTHBM", _) => (35, "Heartbeat"),
        _ => (35, "Normal Location"),
    }
}

/// Two-hex-byte version field parsed as `major.minor`, zero-padded
/// (§4.2.6).
fn parse_version(hex4: &str) -> Option<String> {
    if hex4.len() < 4 {
        return None;
    }
    let major = u8::from_str_radix(&hex4[0..2], 16).ok()?;
    let minor = u8::from_str_radix(&hex4[2..4], 16).ok()?;
    Some(format!("{major:02}.{minor:02}"))
}

/// Parses one `+RESP:`/`+BUFF:` frame. Field positions follow the common
/// Queclink layout: `<prefix>:<command>,<version>,<imei>,<name>,
/// [report-type,]<datetime...>,<lat>,<lon>,<speed>,<heading>,...`
pub fn decode(line: &str) -> Result<DecodedFrame, DecodeError> {
    let line = line.trim();
    let Some(colon) = line.find(':') else {
        return Err(DecodeError::BadSentinel { expected: "+RESP:/+BUFF:" });
    };
    let body = &line[colon + 1..];
    let fields_csv: Vec<&str> = body.trim_end_matches('$').split(',').collect();
    if fields_csv.len() < 6 {
        return Err(DecodeError::TooShort { got: fields_csv.len(), need: 6 });
    }

    let command = fields_csv[0];
    let version = fields_csv[1];
    let imei = fields_csv[2].to_string();
    let family = family_for_version(version);

    // Best-effort positional scan: Queclink frames differ in whether a
    // report-type integer precedes the datetime, so both are tried.
    let mut fields = FieldMap::new();
    if let Some(version_str) = parse_version(version) {
        fields.insert("ProtocolVersion".to_string(), json!(version_str));
    }
    if let Some(family) = family {
        fields.insert("DeviceFamily".to_string(), json!(format!("{family:?}")));
    }

    // A genuine report-type field and a `YYYYMMDDhhmmss` datetime both
    // parse as plain integers, so an integer check alone can't tell them
    // apart — try the datetime format first and only read a report-type
    // out of field 4 when that fails.
    let field4 = fields_csv.get(4).copied().unwrap_or("");
    let mut idx = 4;
    let report_type = if codec::datetime::parse(field4).is_some() {
        None
    } else {
        let rt = field4.parse::<i64>().ok();
        if rt.is_some() {
            idx = 5;
        }
        rt
    };

    let datetime_candidate = fields_csv.get(idx).copied().unwrap_or("");
    if let Some(dt) = codec::datetime::parse(datetime_candidate) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
        idx += 1;
    }

    if let Some(lat) = fields_csv.get(idx).and_then(|s| s.parse::<f64>().ok()) {
        fields.insert("Latitude".to_string(), json!(lat));
        idx += 1;
    }
    if let Some(lon) = fields_csv.get(idx).and_then(|s| s.parse::<f64>().ok()) {
        fields.insert("Longitude".to_string(), json!(lon));
        idx += 1;
    }
    if let Some(speed) = fields_csv.get(idx).and_then(|s| s.parse::<f64>().ok()) {
        fields.insert("Speed".to_string(), json!(speed.round() as i64));
        idx += 1;
    }
    if let Some(heading) = fields_csv.get(idx).and_then(|s| s.parse::<i64>().ok()) {
        fields.insert("Direction".to_string(), json!(heading));
    }

    let (code, name) = event_for_command(command, report_type);
    fields.insert("EventCode".to_string(), json!({"Code": code, "Name": name}));
    fields.insert("PositioningStatus".to_string(), json!("A"));

    let record = IntermediateRecord::single(imei, line, fields);
    Ok(DecodedFrame::record_only(record))
}
