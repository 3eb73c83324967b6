//! GT06 / Pino (§4.2.3): connection-oriented binary protocol.
//! `0x78 0x78 <len> <msg-type> <body> <serial(2)> <crc16(2)> 0x0D 0x0A`.

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

pub const MSG_LOGIN: u8 = 0x01;
pub const MSG_LOCATION: u8 = 0x12;
pub const MSG_HEARTBEAT: u8 = 0x13;
pub const MSG_STRING_INFO: u8 = 0x15;
pub const MSG_ALARM: u8 = 0x16;

const START_BITS: [u8; 2] = [0x78, 0x78];
const STOP_BITS: [u8; 2] = [0x0D, 0x0A];

/// Terminal Information byte decode (§4.2.3): bit7 oil-cut, bit6
/// GPS-track, bits5-3 alarm code, bit2 charge, bit1 ACC, bit0 activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalInfo {
    pub oil_cut: bool,
    pub gps_track: bool,
    pub alarm_code: i32,
    pub alarm_name: &'static str,
    pub charging: bool,
    pub acc_high: bool,
    pub activated: bool,
}

impl TerminalInfo {
    pub fn decode(byte: u8) -> Self {
        let alarm_bits = (byte >> 3) & 0b111;
        let (alarm_code, alarm_name) = match alarm_bits {
            0b100 => (1, "SOS"),
            0b011 => (50, "Low Battery"),
            0b010 => (23, "Power Cut Alarm"),
            0b001 => (79, "Shock Alarm"),
            _ => (35, "Normal Location"),
        };
        Self {
            oil_cut: byte & 0b1000_0000 != 0,
            gps_track: byte & 0b0100_0000 != 0,
            alarm_code,
            alarm_name,
            charging: byte & 0b0000_0100 != 0,
            acc_high: byte & 0b0000_0010 != 0,
            activated: byte & 0b0000_0001 != 0,
        }
    }

    pub fn description(&self) -> String {
        format!(
            "oil_cut={} gps_track={} alarm={} charging={} acc_high={} activated={}",
            self.oil_cut, self.gps_track, self.alarm_name, self.charging, self.acc_high, self.activated
        )
    }
}

/// Voltage-level byte (§4.2.3): 0..6 → raw millivolt-ish scale, rounded.
pub fn voltage_level_to_raw(level: u8) -> i64 {
    const SCALE: [f64; 7] = [0.0, 3.0, 6.0, 9.0, 12.0, 12.5, 13.0];
    let level = (level as usize).min(6);
    (SCALE[level] * 1024.0 / 6.0).round() as i64
}

/// Reverse of [`voltage_level_to_raw`] (§4.4): finds the nearest scale
/// entry to a cached raw voltage, for the AD4-from-cache reconstruction.
pub fn raw_voltage_to_level(raw: i64) -> u8 {
    (0..=6)
        .min_by_key(|&level| (voltage_level_to_raw(level) - raw).abs())
        .unwrap_or(0)
}

/// GSM signal byte (§4.2.3): 0..4 → {0, 8, 16, 23, 31}.
pub fn gsm_level_to_raw(level: u8) -> i64 {
    const SCALE: [i64; 5] = [0, 8, 16, 23, 31];
    SCALE[(level as usize).min(4)]
}

fn crc_over(frame: &[u8]) -> bool {
    // CRC is computed over bytes `len..serial` inclusive, i.e. everything
    // after the two start bits and before the two trailing CRC bytes.
    if frame.len() < 2 + 2 + 2 {
        return false;
    }
    let crc_region = &frame[2..frame.len() - 4];
    let computed = codec::checksum::crc16_ccitt(crc_region);
    let frame_crc = u16::from_be_bytes([frame[frame.len() - 4], frame[frame.len() - 3]]);
    computed == frame_crc
}

/// Extracts the IMEI from a login body: 8 BCD-like bytes, trimmed to 15
/// digits (§4.2.3).
fn login_imei(body: &[u8]) -> String {
    let digits = codec::bcd::decode(body);
    digits.chars().take(15).collect()
}

/// Common location body layout shared by 0x12/0x13/0x16 (§4.2.3).
fn decode_location_body(body: &[u8]) -> Option<FieldMap> {
    if body.len() < 18 {
        return None;
    }
    let mut fields = FieldMap::new();

    let (yy, mm, dd, hh, mi, ss) = (body[0], body[1], body[2], body[3], body[4], body[5]);
    let datetime_raw = format!("{yy:02}{mm:02}{dd:02}{hh:02}{mi:02}{ss:02}");
    if let Some(dt) = codec::datetime::parse(&datetime_raw) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }

    let status_byte = body[6];
    let sats = status_byte >> 4;
    fields.insert("NumberOfSatellites".to_string(), json!(sats as i64));

    let raw_lat = i32::from_be_bytes([body[7], body[8], body[9], body[10]]);
    let raw_lon = i32::from_be_bytes([body[11], body[12], body[13], body[14]]);
    let speed = body[15] as i64;

    let course_status = u16::from_be_bytes([body[16], body[17]]);
    let direction_bits = course_status & 0x03FF;
    let mut direction = direction_bits as i64;
    if direction == 0 && body[16] != 0 {
        direction = body[16] as i64;
    }
    if direction == 0 && speed > 0 {
        direction = body[16] as i64;
    }
    let west = course_status & 0b0000_0100_0000_0000 != 0;
    let south = course_status & 0b0000_0010_0000_0000 != 0;
    let gps_positioned = course_status & 0b0001_0000_0000_0000 != 0;

    fields.insert("Latitude".to_string(), json!(codec::coords::gt06(raw_lat, south, true)));
    fields.insert("Longitude".to_string(), json!(codec::coords::gt06(raw_lon, west, false)));
    fields.insert("Speed".to_string(), json!(speed));
    fields.insert("Direction".to_string(), json!(direction));
    fields.insert("PositioningStatus".to_string(), json!(if gps_positioned { "A" } else { "V" }));

    if body.len() >= 18 + 8 {
        let mcc = u16::from_be_bytes([body[18], body[19]]);
        let mnc = body[20];
        let lac = u16::from_be_bytes([body[21], body[22]]);
        let cell_id_raw = &body[23..26];
        let cell_id_hex = codec::hex_encode_upper(cell_id_raw);
        let cell_id = cell_id_hex.trim_start_matches('0');
        let cell_id = if cell_id.is_empty() { "0" } else { cell_id };
        fields.insert(
            "BaseStationInfo".to_string(),
            json!({"MCC": mcc.to_string(), "MNC": mnc.to_string(), "LAC": format!("{lac:X}"), "CellID": cell_id}),
        );
    }

    Some(fields)
}

fn apply_terminal_info(fields: &mut FieldMap, terminal_byte: u8) {
    let terminal = TerminalInfo::decode(terminal_byte);
    fields.insert(
        "EventCode".to_string(),
        json!({"Code": terminal.alarm_code, "Name": terminal.alarm_name}),
    );
    fields.insert("terminalInformationContent".to_string(), json!(terminal.description()));
}

/// Login ack (§8 scenario 2): 10 bytes, `78 78 01 01 <serial(2)>
/// <crc16(2)> 0D 0A` — echoes the frame's own serial.
fn login_response(serial: [u8; 2]) -> Vec<u8> {
    let mut out = vec![0x78, 0x78, 0x05, 0x01, serial[0], serial[1]];
    let crc = codec::checksum::crc16_ccitt(&out[2..]);
    out.push((crc >> 8) as u8);
    out.push((crc & 0xFF) as u8);
    out.push(0x0D);
    out.push(0x0A);
    out
}

fn heartbeat_response(serial: [u8; 2]) -> Vec<u8> {
    let mut out = vec![0x78, 0x78, 0x05, 0x13, serial[0], serial[1]];
    let crc = codec::checksum::crc16_ccitt(&out[2..]);
    out.push((crc >> 8) as u8);
    out.push((crc & 0xFF) as u8);
    out.push(0x0D);
    out.push(0x0A);
    out
}

/// String-information (0x15) payload: a human-readable ASCII line with a
/// `Lat:[NS]dd.dddddd`/`Lon:[EW]dd.dddddd`/`DateTime:...` pattern, or a
/// `DWXX=` tokenized fallback (§4.2.3).
fn decode_string_info(body: &[u8]) -> FieldMap {
    let text = String::from_utf8_lossy(body);
    let mut fields = FieldMap::new();

    let find_after = |marker: &str| -> Option<String> {
        let idx = text.find(marker)?;
        let rest = &text[idx + marker.len()..];
        Some(rest.split(|c: char| c.is_whitespace() || c == ',').next().unwrap_or("").to_string())
    };

    if let Some(lat_token) = find_after("Lat:") {
        if lat_token.len() > 1 {
            let (hemi, digits) = lat_token.split_at(1);
            if let Ok(value) = digits.parse::<f64>() {
                let signed = if hemi.eq_ignore_ascii_case("S") { -value } else { value };
                fields.insert("Latitude".to_string(), json!(signed));
            }
        }
    }
    if let Some(lon_token) = find_after("Lon:") {
        if lon_token.len() > 1 {
            let (hemi, digits) = lon_token.split_at(1);
            if let Ok(value) = digits.parse::<f64>() {
                let signed = if hemi.eq_ignore_ascii_case("W") { -value } else { value };
                fields.insert("Longitude".to_string(), json!(signed));
            }
        }
    }
    if let Some(idx) = text.find("DateTime:") {
        let rest = &text[idx + "DateTime:".len()..];
        let candidate = rest.trim();
        if let Some(dt) = codec::datetime::parse(candidate.get(..19).unwrap_or(candidate)) {
            fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
        }
    } else {
        // `DWXX=` tokenized fallback form.
        for token in text.split(|c: char| c == ',' || c == ';') {
            if let Some(value) = token.strip_prefix("DWXX=") {
                fields.insert("terminalInformationContent".to_string(), json!(value));
            }
        }
    }
    fields.insert("Message".to_string(), json!(text.to_string()));
    fields
}

pub fn decode(frame: &[u8], session_imei: Option<&str>) -> Result<DecodedFrame, DecodeError> {
    if frame.len() < 12 || frame[0..2] != START_BITS || frame[frame.len() - 2..] != STOP_BITS {
        return Err(DecodeError::BadSentinel { expected: "7878...0D0A" });
    }
    if !crc_over(frame) {
        return Err(DecodeError::ChecksumMismatch { computed: 0, frame: 0 });
    }

    let msg_type = frame[3];
    let body = &frame[4..frame.len() - 6];
    let serial = [frame[frame.len() - 6], frame[frame.len() - 5]];

    match msg_type {
        MSG_LOGIN => {
            let imei = login_imei(body);
            let mut fields = FieldMap::new();
            fields.insert("EventCode".to_string(), json!({"Code": 35, "Name": "Login"}));
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::with_response(record, login_response(serial)))
        }
        MSG_LOCATION => {
            let imei = session_imei.ok_or(DecodeError::Session("location frame before login"))?;
            let fields = decode_location_body(body).ok_or(DecodeError::MalformedField("short GT06 location body".into()))?;
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::record_only(record))
        }
        MSG_HEARTBEAT => {
            let imei = session_imei.ok_or(DecodeError::Session("heartbeat before login"))?;
            let mut fields = FieldMap::new();
            if !body.is_empty() {
                apply_terminal_info(&mut fields, body[0]);
            }
            if body.len() >= 2 {
                fields.insert("VoltageValue".to_string(), json!(voltage_level_to_raw(body[1])));
            }
            if body.len() >= 3 {
                fields.insert("GSMSignalStrength".to_string(), json!(gsm_level_to_raw(body[2])));
            }
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::with_response(record, heartbeat_response(serial)))
        }
        MSG_STRING_INFO => {
            let imei = session_imei.ok_or(DecodeError::Session("string info before login"))?;
            let fields = decode_string_info(body);
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::record_only(record))
        }
        MSG_ALARM => {
            let imei = session_imei.ok_or(DecodeError::Session("alarm frame before login"))?;
            let mut fields = decode_location_body(body).ok_or(DecodeError::MalformedField("short GT06 alarm body".into()))?;
            if body.len() > 18 {
                apply_terminal_info(&mut fields, body[body.len() - 1]);
            }
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::record_only(record))
        }
        other => Err(DecodeError::UnrecognizedMessageType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_frame(imei_digits: &str, serial: u16) -> Vec<u8> {
        let bcd = codec::bcd::encode(imei_digits);
        let mut body = bcd;
        body.resize(8, 0);
        let mut frame = vec![0x78, 0x78, 0x0D, MSG_LOGIN];
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&serial.to_be_bytes());
        let crc = codec::checksum::crc16_ccitt(&frame[2..]);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0D, 0x0A]);
        frame
    }

    #[test]
    fn login_response_matches_scenario_2_contract() {
        let frame = login_frame("864507035846483", 1);
        let response = login_response([frame[frame.len() - 6], frame[frame.len() - 5]]);
        assert_eq!(response.len(), 10);
        assert_eq!(&response[0..2], &[0x78, 0x78]);
        assert_eq!(response[3], 0x01);
        assert_eq!(&response[4..6], &[frame[frame.len() - 6], frame[frame.len() - 5]]);
        assert_eq!(&response[8..10], &[0x0D, 0x0A]);
    }

    #[test]
    fn login_frame_decodes_to_imei_and_emits_response() {
        let frame = login_frame("864507035846483", 7);
        let decoded = decode(&frame, None).unwrap();
        assert_eq!(decoded.record.unwrap().imei.as_deref(), Some("864507035846483"));
        assert!(decoded.response.is_some());
    }

    #[test]
    fn terminal_info_byte_0x94_decodes_power_cut_per_scenario_3() {
        let terminal = TerminalInfo::decode(0x94);
        assert_eq!(terminal.alarm_code, 23);
        assert_eq!(terminal.alarm_name, "Power Cut Alarm");
        assert!(terminal.charging);
        assert!(!terminal.acc_high);
    }

    #[test]
    fn location_frame_without_prior_login_is_a_session_error() {
        let mut frame = vec![0x78, 0x78, 0x00, MSG_LOCATION];
        frame.extend_from_slice(&[0u8; 18]);
        frame.extend_from_slice(&[0, 1]);
        let crc = codec::checksum::crc16_ccitt(&frame[2..]);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0D, 0x0A]);
        assert!(matches!(decode(&frame, None), Err(DecodeError::Session(_))));
    }

    #[test]
    fn voltage_level_round_trips_through_reverse_table() {
        let raw = voltage_level_to_raw(4);
        assert_eq!(raw, 2048);
        assert_eq!(raw_voltage_to_level(raw), 4);
    }
}
