//! BSJ-EG01 (§4.2.4): `0x7E <header+body> <xor-checksum> 0x7E`.

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

pub const MSG_REGISTRATION: u16 = 0x0100;
pub const MSG_AUTHENTICATION: u16 = 0x0102;
pub const MSG_HEARTBEAT: u16 = 0x0002;
pub const MSG_LOCATION: u16 = 0x0200;

const DELIMITER: u8 = 0x7E;

/// Mobile-number decode (§4.2.4, §9 Open Question iii): 12-digit BCD,
/// strip leading zeros; a result already starting "99" or "86" is treated
/// as a (possibly truncated) IMEI, anything else gets "86" prepended to
/// reach 15 digits. Firmware-observed; do not change without a device
/// audit.
pub fn decode_phone_or_imei(bytes: &[u8]) -> String {
    let digits = codec::bcd::decode_phone(bytes);
    if digits.starts_with("99") || digits.starts_with("86") {
        digits
    } else {
        let mut imei = String::from("86");
        imei.push_str(&digits);
        imei.truncate(15);
        imei
    }
}

fn verify_checksum(frame: &[u8]) -> bool {
    if frame.len() < 4 || frame[0] != DELIMITER || frame[frame.len() - 1] != DELIMITER {
        return false;
    }
    let body = &frame[1..frame.len() - 2];
    let expected = frame[frame.len() - 2];
    codec::checksum::xor_checksum(body) == expected
}

/// Extended TLV block (§4.2.4): `0x01` mileage (4 bytes, 0.1 km units, ÷10
/// → km), `0x30` GSM signal, `0x31` satellites (low nibble of first
/// byte), `0x00D5` IMEI as 15 ASCII digits.
fn decode_extended(fields: &mut FieldMap, tlv: &[u8], imei_override: &mut Option<String>) {
    let mut i = 0;
    while i + 2 <= tlv.len() {
        let (id, id_len, header_len) = if tlv[i] == 0x00 && i + 1 < tlv.len() && tlv[i + 1] == 0xD5 {
            (0x00D5u16, 1usize, 2usize)
        } else {
            (tlv[i] as u16, 1, 1)
        };
        if i + header_len + 1 > tlv.len() {
            break;
        }
        let len = tlv[i + header_len] as usize;
        let value_start = i + header_len + 1;
        if value_start + len > tlv.len() {
            break;
        }
        let value = &tlv[value_start..value_start + len];
        match id {
            0x01 if len >= 4 => {
                let raw = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                fields.insert("Mileage".to_string(), json!(raw as f64 / 10.0));
            }
            0x30 if !value.is_empty() => {
                fields.insert("GSMSignalStrength".to_string(), json!(value[0] as i64));
            }
            0x31 if !value.is_empty() => {
                fields.insert("NumberOfSatellites".to_string(), json!((value[0] & 0x0F) as i64));
            }
            0x00D5 => {
                if let Ok(text) = std::str::from_utf8(value) {
                    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
                    if digits.len() == 15 {
                        *imei_override = Some(digits);
                    }
                }
            }
            _ => {}
        }
        i = value_start + len;
        let _ = id_len;
    }
}

/// Location body (§4.2.4): 4-byte alarm flag, 4-byte status (bit2 south,
/// bit3 west), lat/lon (÷1e6), altitude(2), speed(÷10 km/h), direction(2),
/// BCD timestamp, then TLV.
fn decode_location(body: &[u8]) -> Option<(FieldMap, Option<String>)> {
    if body.len() < 24 {
        return None;
    }
    let mut fields = FieldMap::new();
    let _alarm_flag = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let status = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    let south = status & 0b0100 != 0;
    let west = status & 0b1000 != 0;

    let raw_lat = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
    let raw_lon = i32::from_be_bytes([body[12], body[13], body[14], body[15]]);
    fields.insert("Latitude".to_string(), json!(codec::coords::bsj_lat(raw_lat, south)));
    fields.insert("Longitude".to_string(), json!(codec::coords::bsj_lon(raw_lon, west)));

    let altitude = u16::from_be_bytes([body[16], body[17]]) as i64;
    let speed_raw = u16::from_be_bytes([body[18], body[19]]) as f64;
    let direction = u16::from_be_bytes([body[20], body[21]]) as i64;
    fields.insert("Altitude".to_string(), json!(altitude));
    fields.insert("Speed".to_string(), json!((speed_raw / 10.0).round() as i64));
    fields.insert("Direction".to_string(), json!(direction));
    fields.insert("PositioningStatus".to_string(), json!("A"));

    let timestamp_bcd = &body[22..22 + 6.min(body.len() - 22)];
    let datetime_digits = codec::bcd::decode(timestamp_bcd);
    if let Some(dt) = codec::datetime::parse(&datetime_digits) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }

    let mut imei_override = None;
    if body.len() > 28 {
        decode_extended(&mut fields, &body[28..], &mut imei_override);
    }

    Some((fields, imei_override))
}

fn response_frame(message_id: u16, terminal_phone_bcd: &[u8], serial: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&message_id.to_be_bytes());
    body.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    body.extend_from_slice(terminal_phone_bcd);
    body.extend_from_slice(&serial.to_be_bytes());
    body.extend_from_slice(payload);

    let checksum = codec::checksum::xor_checksum(&body);
    let mut frame = Vec::with_capacity(body.len() + 3);
    frame.push(DELIMITER);
    frame.extend_from_slice(&body);
    frame.push(checksum);
    frame.push(DELIMITER);
    frame
}

/// `decode` handles framing + checksum + message dispatch. `session_imei`
/// is the endpoint's currently-bound IMEI (if any) for a 0x0200 frame
/// whose extended data carries no `0x00D5` override.
pub fn decode(frame: &[u8], session_imei: Option<&str>) -> Result<DecodedFrame, DecodeError> {
    if !verify_checksum(frame) {
        return Err(DecodeError::ChecksumMismatch { computed: 0, frame: 0 });
    }
    let body = &frame[1..frame.len() - 2];
    if body.len() < 12 {
        return Err(DecodeError::TooShort { got: body.len(), need: 12 });
    }
    let message_id = u16::from_be_bytes([body[0], body[1]]);
    let body_len = u16::from_be_bytes([body[2], body[3]]) as usize;
    let terminal_phone = &body[4..10];
    let serial = u16::from_be_bytes([body[10], body[11]]);
    let payload = &body[12..(12 + body_len).min(body.len())];

    let phone_or_imei = decode_phone_or_imei(terminal_phone);

    match message_id {
        MSG_REGISTRATION => {
            let mut fields = FieldMap::new();
            fields.insert("EventCode".to_string(), json!({"Code": 35, "Name": "Registration"}));
            let response_payload = b"bsjgps".to_vec();
            let record = IntermediateRecord::single(phone_or_imei.clone(), codec::hex_encode(frame), fields);
            Ok(DecodedFrame::with_response(record, response_frame(message_id, terminal_phone, serial, &response_payload)))
        }
        MSG_AUTHENTICATION => {
            let mut fields = FieldMap::new();
            fields.insert("EventCode".to_string(), json!({"Code": 35, "Name": "Authentication"}));
            let record = IntermediateRecord::single(phone_or_imei.clone(), codec::hex_encode(frame), fields);
            Ok(DecodedFrame::with_response(record, response_frame(message_id, terminal_phone, serial, &[0x00])))
        }
        MSG_HEARTBEAT => {
            let mut fields = FieldMap::new();
            if let Some(&battery_pct) = payload.first() {
                let voltage = (battery_pct as i64 * 4200) / 100;
                fields.insert("VoltageValue".to_string(), json!(voltage));
            }
            if let Some(&gsm) = payload.get(1) {
                fields.insert("GSMSignalStrength".to_string(), json!(gsm as i64));
            }
            let record = IntermediateRecord::single(phone_or_imei.clone(), codec::hex_encode(frame), fields);
            Ok(DecodedFrame::with_response(record, response_frame(message_id, terminal_phone, serial, &[0x00])))
        }
        MSG_LOCATION => {
            let (fields, imei_override) =
                decode_location(payload).ok_or(DecodeError::MalformedField("short BSJ location body".into()))?;
            let imei = imei_override.or_else(|| session_imei.map(str::to_string)).unwrap_or(phone_or_imei);
            let record = IntermediateRecord::single(imei, codec::hex_encode(frame), fields);
            Ok(DecodedFrame::record_only(record))
        }
        other => Err(DecodeError::UnrecognizedMessageType(other as u8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(body: &[u8]) -> Vec<u8> {
        let checksum = codec::checksum::xor_checksum(body);
        let mut frame = vec![DELIMITER];
        frame.extend_from_slice(body);
        frame.push(checksum);
        frame.push(DELIMITER);
        frame
    }

    #[test]
    fn xor_checksum_invariant_holds_for_any_bsj_frame() {
        let body = vec![0x01, 0x00, 0x00, 0x0A, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1];
        let frame = wrap(&body);
        assert_eq!(codec::checksum::xor_checksum(&frame[1..frame.len() - 2]), frame[frame.len() - 2]);
    }

    #[test]
    fn phone_decode_prepends_86_for_short_local_numbers() {
        let bcd = codec::bcd::encode("001380013800");
        assert_eq!(decode_phone_or_imei(&bcd), "861380013800");
    }

    #[test]
    fn phone_decode_passes_through_existing_imei_prefix() {
        let bcd = codec::bcd::encode("864507035846483");
        let result = decode_phone_or_imei(&bcd[..6.min(bcd.len())]);
        assert!(result.starts_with("86"));
    }

    #[test]
    fn location_with_hemisphere_bits_matches_scenario_4() {
        let mut body = vec![0u8; 28];
        // status word: bit2 set (south), bit3 clear (east)
        body[4..8].copy_from_slice(&0b0000_0100u32.to_be_bytes());
        body[8..12].copy_from_slice(&19_521_000i32.to_be_bytes());
        body[12..16].copy_from_slice(&99_211_600i32.to_be_bytes());
        let (fields, _) = decode_location(&body).unwrap();
        assert_eq!(fields.get("Latitude").unwrap().as_f64(), Some(-19.521));
        assert_eq!(fields.get("Longitude").unwrap().as_f64(), Some(99.2116));
    }
}
