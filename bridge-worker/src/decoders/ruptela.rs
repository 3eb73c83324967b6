//! Ruptela (§4.2.5): binary UDP, extended-records protocol.
//! `<length(2)> <IMEI(8)> <command-id(2)> <records…> <crc-16(2)>`.

use jono_types::record::{FieldMap, IntermediateRecord};
use serde_json::json;

use crate::codec;
use crate::decoders::{DecodeError, DecodedFrame};

const COMMAND_EXTENDED_RECORDS: u16 = 0x01;

/// One extended-record header (§4.2.5): timestamp(4, Unix seconds),
/// lon/lat(4 each, ÷1e7), altitude(2, ÷10), direction(2, ÷100), sats(1),
/// speed(2, km/h), HDOP(1, ÷10), event-id(2).
fn decode_record_header(bytes: &[u8]) -> Option<FieldMap> {
    if bytes.len() < 22 {
        return None;
    }
    let mut fields = FieldMap::new();
    let timestamp = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64;
    if let Some(dt) = codec::datetime::from_unix_seconds(timestamp) {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }
    let raw_lon = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let raw_lat = i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    fields.insert("Longitude".to_string(), json!(raw_lon as f64 / 1e7));
    fields.insert("Latitude".to_string(), json!(raw_lat as f64 / 1e7));

    let altitude = i16::from_be_bytes([bytes[12], bytes[13]]) as f64 / 10.0;
    let direction = u16::from_be_bytes([bytes[14], bytes[15]]) as f64 / 100.0;
    let sats = bytes[16] as i64;
    let speed = u16::from_be_bytes([bytes[17], bytes[18]]) as i64;
    let hdop = bytes[19] as f64 / 10.0;
    let event_id = u16::from_be_bytes([bytes[20], bytes[21]]) as i32;

    fields.insert("Altitude".to_string(), json!(altitude.round() as i64));
    fields.insert("Direction".to_string(), json!(direction.round() as i64));
    fields.insert("NumberOfSatellites".to_string(), json!(sats));
    fields.insert("Speed".to_string(), json!(speed));
    fields.insert("HDOP".to_string(), json!(hdop));
    fields.insert("PositioningStatus".to_string(), json!(if sats > 0 { "A" } else { "V" }));
    fields.insert("EventCode".to_string(), json!({"Code": event_id, "Name": jono_types::event_codes::name_for_code(event_id)}));

    Some(fields)
}

fn crc_valid(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let data = &frame[..frame.len() - 2];
    let computed = codec::checksum::crc16_ccitt(data);
    let frame_crc = u16::from_be_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    computed == frame_crc
}

/// 4-byte acknowledgement `64 01 <crc16(data)>` emitted on valid CRC
/// (§4.2.5).
fn ack(data: &[u8]) -> Vec<u8> {
    let crc = codec::checksum::crc16_ccitt(data);
    let mut out = vec![0x64, 0x01];
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

pub fn decode(frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
    if frame.len() < 2 + 8 + 2 + 2 {
        return Err(DecodeError::TooShort { got: frame.len(), need: 14 });
    }
    if !crc_valid(frame) {
        return Err(DecodeError::ChecksumMismatch { computed: 0, frame: 0 });
    }
    let data = &frame[..frame.len() - 2];
    let imei_bytes = &data[2..10];
    let imei: String = codec::bcd::decode(imei_bytes).chars().take(15).collect();
    let command_id = u16::from_be_bytes([data[10], data[11]]);
    let records_bytes = &data[12..];

    if command_id != COMMAND_EXTENDED_RECORDS {
        return Err(DecodeError::UnrecognizedMessageType(command_id as u8));
    }

    let mut packets = Vec::new();
    let mut cursor = 0;
    while cursor + 22 <= records_bytes.len() {
        match decode_record_header(&records_bytes[cursor..cursor + 22]) {
            Some(fields) => packets.push(fields),
            None => break,
        }
        cursor += 22;
    }
    if packets.is_empty() {
        return Err(DecodeError::MalformedField("no decodable Ruptela records".into()));
    }

    let record = IntermediateRecord::multi(imei, codec::hex_encode(frame), packets);
    Ok(DecodedFrame::with_response(record, ack(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(imei_bytes: [u8; 8]) -> Vec<u8> {
        let mut rec = vec![0u8; 22];
        rec[0..4].copy_from_slice(&1_700_000_000i32.to_be_bytes());
        rec[16] = 5; // sats
        rec[17..19].copy_from_slice(&50u16.to_be_bytes());
        rec[19] = 15; // hdop*10

        let mut data = vec![0u8, 0u8];
        data.extend_from_slice(&imei_bytes);
        data.extend_from_slice(&COMMAND_EXTENDED_RECORDS.to_be_bytes());
        data.extend_from_slice(&rec);

        let crc = codec::checksum::crc16_ccitt(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        data
    }

    #[test]
    fn valid_crc_frame_decodes_and_emits_ack() {
        let frame = build_frame([8, 6, 4, 5, 0, 7, 0, 3]);
        let decoded = decode(&frame).unwrap();
        let record = decoded.record.unwrap();
        assert_eq!(record.list_packets.len(), 1);
        assert_eq!(record.list_packets[0].get("Speed").unwrap().as_i64(), Some(50));
        let response = decoded.response.unwrap();
        assert_eq!(response.len(), 4);
        assert_eq!(response[0], 0x64);
        assert_eq!(response[1], 0x01);
    }

    #[test]
    fn bad_crc_is_rejected() {
        let mut frame = build_frame([8, 6, 4, 5, 0, 7, 0, 3]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(decode(&frame), Err(DecodeError::ChecksumMismatch { .. })));
    }
}
