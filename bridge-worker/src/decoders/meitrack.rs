//! Meitrack (§4.2.1): ASCII comma-delimited frames, `$$<id><len>,<IMEI>,
//! <CommandType>,<rest>*<checksum>`. `AAA` is a flat comma-schema; `CCE`/
//! `CFF`/`CCC` carry a binary-in-ASCII TLV body read by a byte cursor.

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

/// AAA's private event-code table (§4.2.1): the leading comma field is a
/// Meitrack-specific digital-input/alarm code, translated to a name that
/// intentionally does not match the shared catalog's name for the same
/// number (code 1 here means "Input 1 Active", not "SOS" — see
/// `jono_types::assembler::resolve_event_code`).
fn aaa_event_name(code: i32) -> &'static str {
    match code {
        1 => "Input 1 Active",
        2 => "Input 2 Active",
        3 => "Input 3 Active",
        4 => "GPS Antenna Cut",
        16 => "Overspeed",
        17 => "Entering Geo-fence",
        18 => "Exiting Geo-fence",
        46 => "SOS",
        hb if hb == 0 => "Track By Time Interval",
        _ => "Normal Location",
    }
}

/// Parses one `AAA` frame. Returns `None` only when the frame lacks the
/// minimum `$$...,IMEI,AAA,...` shape (§4.2.1 edge policy: missing
/// trailing fields yield nulls, not errors — only structural absence of
/// the header is fatal).
pub fn decode_aaa(frame: &str) -> Result<IntermediateRecord, DecodeError> {
    // Header is `$$<id+len>,<IMEI>,<CommandType>,<rest>`; splitn(4, ',')
    // peels the first three comma-delimited fields off without touching
    // any commas inside `rest` (which has dozens of its own).
    let after_prefix = frame.trim_start_matches("$$");
    let mut header = after_prefix.splitn(4, ',');
    header.next().ok_or(DecodeError::TooShort { got: frame.len(), need: 4 })?;
    let imei = header.next().ok_or(DecodeError::TooShort { got: frame.len(), need: 4 })?.to_string();
    let command_type = header.next().ok_or(DecodeError::MalformedField("missing command type".into()))?;
    if command_type != "AAA" {
        return Err(DecodeError::MalformedField("not an AAA frame".into()));
    }
    let csv = header.next().unwrap_or_default();

    let parts: Vec<&str> = csv.split(',').collect();
    if parts.is_empty() {
        return Err(DecodeError::TooShort { got: 0, need: 1 });
    }

    // parts is now the AAA field list (event, lat, lon, datetime, ...).
    let get = |i: usize| parts.get(i).copied().unwrap_or("");
    let checksum_trimmed: Vec<&str> = get(parts.len().saturating_sub(1)).splitn(2, '*').collect();
    let mut fields = FieldMap::new();

    let event_raw = get(0).parse::<i32>().unwrap_or(0);
    fields.insert(
        "EventCode".to_string(),
        json!({"Code": event_raw, "Name": aaa_event_name(event_raw)}),
    );
    if let Ok(lat) = get(1).parse::<f64>() {
        fields.insert("Latitude".to_string(), json!(lat));
    }
    if let Ok(lon) = get(2).parse::<f64>() {
        fields.insert("Longitude".to_string(), json!(lon));
    }
    // §4.2.1 edge policy: some firmware variants shift the datetime by one
    // field; if the documented position doesn't parse, try the next one.
    let datetime = codec::datetime::parse(get(3)).or_else(|| codec::datetime::parse(get(4)));
    if let Some(dt) = datetime {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }
    fields.insert("PositioningStatus".to_string(), json!(get(4)));
    if let Ok(sats) = get(5).parse::<i64>() {
        fields.insert("NumberOfSatellites".to_string(), json!(sats));
    }
    if let Ok(gsm) = get(6).parse::<i64>() {
        fields.insert("GSMSignalStrength".to_string(), json!(gsm));
    }
    if let Ok(speed) = get(7).parse::<i64>() {
        fields.insert("Speed".to_string(), json!(speed));
    }
    if let Ok(direction) = get(8).parse::<i64>() {
        fields.insert("Direction".to_string(), json!(direction));
    }
    if let Ok(hdop) = get(9).parse::<f64>() {
        fields.insert("HDOP".to_string(), json!(hdop));
    }
    if let Ok(altitude) = get(10).parse::<i64>() {
        fields.insert("Altitude".to_string(), json!(altitude));
    }
    if let Ok(mileage) = get(11).parse::<i64>() {
        fields.insert("Mileage".to_string(), json!(mileage));
    }
    if let Ok(run_time) = get(12).parse::<i64>() {
        fields.insert("RunTime".to_string(), json!(run_time));
    }
    if let Some(bsi) = get(13).split_once('|').map(|_| get(13)) {
        let pieces: Vec<&str> = bsi.split('|').collect();
        if pieces.len() == 4 {
            fields.insert(
                "BaseStationInfo".to_string(),
                json!({"MCC": pieces[0], "MNC": pieces[1], "LAC": pieces[2], "CellID": pieces[3]}),
            );
        }
    }
    if !get(15).is_empty() {
        let ad: Vec<&str> = get(15).split('|').collect();
        let mut analog = serde_json::Map::new();
        for (i, hex) in ad.iter().enumerate().take(5) {
            analog.insert(format!("AD{}", i + 1), json!(hex));
        }
        fields.insert("AnalogInputs".to_string(), json!(analog));
    }
    if !checksum_trimmed.is_empty() {
        fields.insert("Message".to_string(), json!(frame));
    }

    Ok(IntermediateRecord::single(imei, frame, fields))
}

/// One Meitrack CCE/CFF TLV entry, already resolved to a semantic field
/// name and a JSON value (§4.2.1 ID tables `IDOneByte`/`IDTwoBytes`/
/// `IDFourBytes`/`IDUndefinedBytes`). Only the IDs the spec names by
/// number are implemented; an unrecognized ID is skipped, not fatal,
/// since the cursor still knows how many bytes to consume from the
/// group's declared width.
fn decode_id_entry(id: u16, value_hex: &str) -> Option<(&'static str, serde_json::Value)> {
    let le = |h: &str| codec::le_u64(&codec::hex_decode(h).ok()?);
    match id {
        0x01 => {
            let code = le(value_hex)? as i32;
            Some(("EventCode", json!({"Code": code, "Name": aaa_event_name(code)})))
        }
        0x02 => {
            let raw = codec::twos_complement(le(value_hex)?, (value_hex.len() * 4) as u32);
            Some(("Latitude", json!(raw as f64 / 1_000_000.0)))
        }
        0x03 => {
            let raw = codec::twos_complement(le(value_hex)?, (value_hex.len() * 4) as u32);
            Some(("Longitude", json!(raw as f64 / 1_000_000.0)))
        }
        0x04 => {
            let seconds = le(value_hex)? as i64;
            let dt = codec::datetime::from_seconds_since_2000(seconds)?;
            Some(("Datetime", json!(dt.to_rfc3339())))
        }
        0x05 => Some(("PositioningStatus", json!(if le(value_hex)? != 0 { "A" } else { "V" }))),
        0x08 => Some(("Speed", json!(le(value_hex)?))),
        0x0B => Some(("Altitude", json!(le(value_hex)?))),
        0x0C => Some(("Mileage", json!(le(value_hex)?))),
        0x0E => {
            let bytes = codec::hex_decode(value_hex).ok()?;
            Some(("BaseStationInfo", json!({"Raw": codec::hex_encode(&bytes)})))
        }
        0x49 => Some(("CameraStatus", json!({"Status": value_hex}))),
        0x4B => Some(("CurrentNetworkInfo", json!({"Descriptor": value_hex}))),
        0xFE2D => Some(("FatigueDrivingInformation", json!({"Descriptor": value_hex}))),
        0xFE31 => Some(("AdditionalAlertInfoADASDMS", json!({"Descriptor": value_hex}))),
        0xFE71 => Some(("BluetoothBeaconA", json!({"Raw": value_hex}))),
        0xFE72 => Some(("BluetoothBeaconB", json!({"Raw": value_hex}))),
        0xFE73 => Some(("TemperatureAndHumiditySensor", json!({"Raw": value_hex}))),
        _ => None,
    }
}

/// The width, in hex characters, of one value for a given one-byte-id
/// group (§4.2.1: ID groups of sizes {1, 2, 4, variable}).
fn group_value_hex_len(group_index: usize) -> Option<usize> {
    match group_index {
        0 => Some(2),  // 1-byte values
        1 => Some(4),  // 2-byte values
        2 => Some(8),  // 4-byte values
        _ => None,     // variable-length group, has its own length prefix
    }
}

/// Cursor reader over a hex string, consuming a fixed character count at a
/// time — the shape every Meitrack binary-in-ASCII sub-parser shares.
struct HexCursor<'a> {
    hex: &'a str,
    pos: usize,
}

impl<'a> HexCursor<'a> {
    fn new(hex: &'a str) -> Self {
        Self { hex, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a str> {
        let end = self.pos + n;
        if end > self.hex.len() {
            return None;
        }
        let s = &self.hex[self.pos..end];
        self.pos = end;
        Some(s)
    }

    fn take_u32(&mut self, hex_chars: usize) -> Option<u64> {
        let s = self.take(hex_chars)?;
        Some(codec::le_u64(&codec::hex_decode(s).ok()?))
    }

    fn remaining(&self) -> usize {
        self.hex.len().saturating_sub(self.pos)
    }
}

/// Parses one `CCE`/`CFF` sub-packet's ID-TLV body (§4.2.1). On the first
/// sub-packet's failure the whole frame is rejected by the caller;
/// subsequent sub-packets truncate the list at the first failure instead.
fn decode_packet_body(hex: &str) -> Option<FieldMap> {
    let mut cursor = HexCursor::new(hex);
    let _id_block_len = cursor.take_u32(4)?;
    let mut fields = FieldMap::new();

    for group_index in 0..4 {
        if cursor.remaining() < 2 {
            break;
        }
        let count = cursor.take_u32(2)? as usize;
        for _ in 0..count {
            let id_byte = cursor.take_u32(2)? as u16;
            let (id, value_len) = if id_byte == 0xFE {
                let ext = cursor.take_u32(2)? as u16;
                let full_id = 0xFE00 | ext;
                let explicit_len = cursor.take_u32(2)? as usize;
                (full_id, explicit_len * 2)
            } else {
                (id_byte, group_value_hex_len(group_index).unwrap_or(0))
            };
            let value_hex = cursor.take(value_len)?;
            if let Some((name, value)) = decode_id_entry(id, value_hex) {
                fields.insert(name.to_string(), value);
            }
        }
    }
    Some(fields)
}

/// `CCE`/`CFF`: multi-packet binary-in-ASCII frames (§4.2.1).
pub fn decode_cce_cff(frame: &str, command_type: &str) -> Result<IntermediateRecord, DecodeError> {
    let comma_split: Vec<&str> = frame.trim_start_matches("$$").splitn(4, ',').collect();
    if comma_split.len() < 4 {
        return Err(DecodeError::TooShort { got: comma_split.len(), need: 4 });
    }
    let imei = comma_split[1].to_string();
    if comma_split[2] != command_type {
        return Err(DecodeError::MalformedField("command type mismatch".into()));
    }
    let rest = comma_split[3].splitn(2, '*').next().unwrap_or_default();

    let mut cursor = HexCursor::new(rest);
    let _remaining_cache_records = cursor.take_u32(8);
    let data_packets = cursor.take_u32(4).ok_or(DecodeError::MalformedField("missing packet count".into()))? as usize;

    let mut packets = Vec::with_capacity(data_packets);
    for i in 0..data_packets {
        let packet_len_hex = match cursor.take(4) {
            Some(v) => v,
            None => break,
        };
        let packet_hex_len = u32::from_str_radix(packet_len_hex, 16).unwrap_or(0) as usize * 2;
        let packet_hex = match cursor.take(packet_hex_len.min(cursor.remaining())) {
            Some(v) => v,
            None => break,
        };
        match decode_packet_body(packet_hex) {
            Some(fields) => packets.push(fields),
            None if i == 0 => return Err(DecodeError::MalformedField("first sub-packet failed to decode".into())),
            None => break,
        }
    }

    Ok(IntermediateRecord::multi(imei, frame, packets))
}

/// `CCC`: a single-packet binary-in-ASCII frame, reusing the CCE/CFF
/// sub-packet body parser directly since the wire layout is identical
/// minus the outer multi-packet framing.
pub fn decode_ccc(frame: &str) -> Result<IntermediateRecord, DecodeError> {
    let comma_split: Vec<&str> = frame.trim_start_matches("$$").splitn(4, ',').collect();
    if comma_split.len() < 4 {
        return Err(DecodeError::TooShort { got: comma_split.len(), need: 4 });
    }
    let imei = comma_split[1].to_string();
    let rest = comma_split[3].splitn(2, '*').next().unwrap_or_default();
    let fields = decode_packet_body(rest).ok_or(DecodeError::MalformedField("CCC body failed to decode".into()))?;
    Ok(IntermediateRecord::single(imei, frame, fields))
}

/// Entry point dispatched by command type (§4.2.1: `AAA`, `CCE`, `CFF`,
/// `CCC`).
pub fn decode(frame: &str) -> Result<DecodedFrame, DecodeError> {
    let command_type = frame
        .trim_start_matches("$$")
        .splitn(4, ',')
        .nth(2)
        .ok_or(DecodeError::MalformedField("no command type field".into()))?;
    let record = match command_type {
        "AAA" => decode_aaa(frame)?,
        "CCE" => decode_cce_cff(frame, "CCE")?,
        "CFF" => decode_cce_cff(frame, "CFF")?,
        "CCC" => decode_ccc(frame)?,
        other => return Err(DecodeError::MalformedField(format!("unknown Meitrack command {other}").into())),
    };
    Ok(DecodedFrame::record_only(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_AAA: &str = "$$f167,864507035846483,AAA,1,18.950273,-97.922888,241205120405,V,0,13,0,69,0.0,2217,358868041,192062311,334|3|7663|00AA7FAB,0000,0001|0000|0000|01A5|0514,,,3,,,108,106*C6";

    #[test]
    fn aaa_spec_walkthrough_matches_documented_fields() {
        let record = decode_aaa(SAMPLE_AAA).unwrap();
        assert_eq!(record.imei.as_deref(), Some("864507035846483"));
        let fields = &record.top_level;
        assert_eq!(fields.get("Latitude").unwrap().as_f64(), Some(18.950273));
        assert_eq!(fields.get("Longitude").unwrap().as_f64(), Some(-97.922888));
        assert_eq!(fields.get("Altitude").unwrap().as_i64(), Some(2217));
        assert_eq!(fields.get("Speed").unwrap().as_i64(), Some(0));
        assert_eq!(fields.get("Direction").unwrap().as_i64(), Some(69));
        let event = fields.get("EventCode").unwrap();
        assert_eq!(event["Code"], 1);
        assert_eq!(event["Name"], "Input 1 Active");
        assert_eq!(fields.get("Mileage").unwrap().as_i64(), Some(358868041));
        let bsi = fields.get("BaseStationInfo").unwrap();
        assert_eq!(bsi["MCC"], "334");
        assert_eq!(bsi["MNC"], "3");
        assert_eq!(bsi["LAC"], "7663");
        assert_eq!(bsi["CellID"], "00AA7FAB");
        assert_eq!(fields.get("AnalogInputs").unwrap()["AD5"], "0514");
    }

    #[test]
    fn unknown_command_type_is_malformed_field_error() {
        let frame = "$$f010,864507035846483,ZZZ,1*00";
        assert!(decode(frame).is_err());
    }

    #[test]
    fn missing_trailing_fields_yield_nulls_not_errors() {
        let frame = "$$f010,864507035846483,AAA,1,18.95,-97.92*00";
        let record = decode_aaa(frame).unwrap();
        assert!(record.top_level.get("Altitude").is_none());
    }
}
