//! The decoder-to-assembler handoff type (§3 "Intermediate Record").
//!
//! Decoders disagree about which fields they can even populate, and the
//! assembler has to read both `GSMSignalStrength` and the legacy
//! `GsmSignalStrength` spelling (Open Question i) — an untyped bag keyed by
//! field name, the same shape the decoders naturally produce, is a better
//! fit here than a fully typed struct with thirty `Option` fields.

use indexmap::IndexMap;
use serde_json::Value;

/// A single flat field bag, as one decoder invocation produces for one
/// sub-packet (or for the whole frame, when there is no multi-packet
/// structure).
pub type FieldMap = IndexMap<String, Value>;

/// Output of any protocol decoder, consumed by the assembler.
#[derive(Debug, Clone, Default)]
pub struct IntermediateRecord {
    /// IMEI bound to this record, when the decoder could determine one
    /// (location/heartbeat frames always can; pure session frames may not
    /// need one resolved at the decoder layer at all).
    pub imei: Option<String>,
    /// Raw frame text or hex, preserved byte-for-byte (§3 invariant).
    pub message: Option<String>,
    /// When the frame carries multiple sub-packets, one `FieldMap` per
    /// sub-packet, in wire order. Empty when the decoder instead populates
    /// `top_level` for a single implicit `Packet1`.
    pub list_packets: Vec<FieldMap>,
    /// Fields for the single-packet case. Ignored by the assembler when
    /// `list_packets` is non-empty.
    pub top_level: FieldMap,
}

impl IntermediateRecord {
    pub fn single(imei: impl Into<String>, message: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            imei: Some(imei.into()),
            message: Some(message.into()),
            list_packets: Vec::new(),
            top_level: fields,
        }
    }

    pub fn multi(imei: impl Into<String>, message: impl Into<String>, packets: Vec<FieldMap>) -> Self {
        Self {
            imei: Some(imei.into()),
            message: Some(message.into()),
            list_packets: packets,
            top_level: FieldMap::new(),
        }
    }

    /// The per-packet field maps the assembler should iterate, preserving
    /// order (§4.5: "if the record already has `ListPackets`, iterate it
    /// preserving order; otherwise wrap the top-level fields as `Packet1`").
    pub fn packets(&self) -> Vec<&FieldMap> {
        if self.list_packets.is_empty() {
            vec![&self.top_level]
        } else {
            self.list_packets.iter().collect()
        }
    }

    /// Reads `GSMSignalStrength`, falling back to the legacy
    /// `GsmSignalStrength` spelling (Open Question i).
    pub fn gsm_signal_strength(fields: &FieldMap) -> Option<&Value> {
        fields
            .get("GSMSignalStrength")
            .or_else(|| fields.get("GsmSignalStrength"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_packet_record_wraps_top_level_fields() {
        let mut fields = FieldMap::new();
        fields.insert("Latitude".to_string(), json!(18.95));
        let record = IntermediateRecord::single("123", "raw", fields);
        assert_eq!(record.packets().len(), 1);
        assert_eq!(record.packets()[0].get("Latitude"), Some(&json!(18.95)));
    }

    #[test]
    fn gsm_signal_strength_accepts_legacy_spelling() {
        let mut fields = FieldMap::new();
        fields.insert("GsmSignalStrength".to_string(), json!(3));
        assert_eq!(IntermediateRecord::gsm_signal_strength(&fields), Some(&json!(3)));
    }

    #[test]
    fn multi_packet_record_preserves_wire_order() {
        let mut first = FieldMap::new();
        first.insert("Speed".to_string(), json!(10));
        let mut second = FieldMap::new();
        second.insert("Speed".to_string(), json!(20));
        let record = IntermediateRecord::multi("123", "raw", vec![first, second]);
        let packets = record.packets();
        assert_eq!(packets[0].get("Speed"), Some(&json!(10)));
        assert_eq!(packets[1].get("Speed"), Some(&json!(20)));
    }
}
