//! # codec
//!
//! Primitive byte/hex/BCD/checksum/coordinate/datetime conversions shared
//! by every protocol decoder. Nothing here knows about any specific wire
//! format — it's the alphabet the decoders are written in.

pub mod bcd;
pub mod checksum;
pub mod coords;
pub mod datetime;

use chrono::{DateTime, Utc};

/// Decodes a hex string to bytes. Case-insensitive; odd-length or
/// non-hex-digit input is a recoverable error — callers commonly fall back
/// to treating the buffer as raw bytes when this fails.
pub fn hex_decode(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(input.trim())
}

pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn hex_encode_upper(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Reads `bytes` as a little-endian unsigned integer. Used pervasively by
/// Meitrack/Skywave/Huabao TLV fields, which store multi-byte values
/// byte-swapped relative to network order.
pub fn le_u64(bytes: &[u8]) -> u64 {
    let mut acc: u64 = 0;
    for (i, b) in bytes.iter().enumerate().take(8) {
        acc |= (*b as u64) << (8 * i);
    }
    acc
}

pub fn le_i64(bytes: &[u8], bit_width: u32) -> i64 {
    twos_complement(le_u64(bytes), bit_width)
}

/// Sign-extends an N-bit unsigned value into a signed 64-bit integer.
pub fn twos_complement(value: u64, bit_width: u32) -> i64 {
    debug_assert!(bit_width > 0 && bit_width <= 64);
    let sign_bit = 1u64 << (bit_width - 1);
    if value & sign_bit != 0 {
        (value as i64) - (1i64 << bit_width)
    } else {
        value as i64
    }
}

/// Parses one of the wire datetime formats into UTC. Thin re-export of
/// [`datetime::parse`] kept at the top of the module since every decoder
/// reaches for it constantly.
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    datetime::parse(input)
}

/// Ingress payload resolution (§1/§4.6): a device frame may arrive as
/// hex-encoded ASCII over the broker. Known ASCII sentinels (`$$`, `@@`)
/// mean the buffer is already the frame, never hex; otherwise hex-decode
/// is attempted and the raw bytes are kept unchanged when that fails.
pub fn resolve_ingress_payload(payload: &[u8]) -> Vec<u8> {
    if payload.starts_with(b"$$") || payload.starts_with(b"@@") {
        return payload.to_vec();
    }
    let Ok(text) = std::str::from_utf8(payload) else {
        return payload.to_vec();
    };
    let text = text.trim();
    if text.is_empty() || text.len() % 2 != 0 {
        return payload.to_vec();
    }
    match hex_decode(text) {
        Ok(decoded) => decoded,
        Err(_) => payload.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_u64_reverses_byte_order() {
        assert_eq!(le_u64(&[0x01, 0x00]), 1);
        assert_eq!(le_u64(&[0x00, 0x01]), 256);
    }

    #[test]
    fn twos_complement_round_trips_negative_values() {
        assert_eq!(twos_complement(0xFFFF_FFFF, 32), -1);
        assert_eq!(twos_complement(0x7FFF_FFFF, 32), i32::MAX as i64);
        assert_eq!(twos_complement(1, 32), 1);
    }

    #[test]
    fn resolve_ingress_payload_leaves_dollar_sentinel_frames_raw() {
        let raw = b"$$f167,864507035846483,AAA,1*C6".to_vec();
        assert_eq!(resolve_ingress_payload(&raw), raw);
    }

    #[test]
    fn resolve_ingress_payload_hex_decodes_an_encoded_frame() {
        let frame = [0x78, 0x78, 0x05, 0x01, 0x02, 0x03, 0x0D, 0x0A];
        let hex = hex_encode(&frame).into_bytes();
        assert_eq!(resolve_ingress_payload(&hex), frame);
    }

    #[test]
    fn resolve_ingress_payload_falls_back_to_raw_on_bad_hex() {
        let raw = b"not hex at all".to_vec();
        assert_eq!(resolve_ingress_payload(&raw), raw);
    }

    #[test]
    fn parse_datetime_accepts_every_documented_format() {
        assert!(parse_datetime("241205120405").is_some());
        assert!(parse_datetime("20241205120405").is_some());
        assert!(parse_datetime("2024-12-05 12:04:05").is_some());
        assert!(parse_datetime("2024-12-05T12:04:05Z").is_some());
        assert_eq!(
            parse_datetime("241205120405").unwrap().to_rfc3339(),
            "2024-12-05T12:04:05+00:00"
        );
    }
}
