//! The canonical envelope ("Jono") published on `tracker/jonoprotocol`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// Packet keys are insertion-ordered (`Packet1`, `Packet2`, ...) — an
/// `IndexMap` preserves that without resorting to a `Vec<(String, Packet)>`
/// and still serializes as a plain JSON object.
pub type ListPackets = IndexMap<String, Packet>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JonoEnvelope {
    #[serde(rename = "IMEI")]
    pub imei: String,
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "DataPackets")]
    pub data_packets: i64,
    #[serde(rename = "ListPackets")]
    pub list_packets: ListPackets,
}

impl JonoEnvelope {
    /// Builds an envelope from an already-ordered list of packets, keying
    /// them `Packet1`, `Packet2`, ... in the order given.
    pub fn new(imei: impl Into<String>, message: Option<String>, packets: Vec<Packet>) -> Self {
        let mut list_packets = ListPackets::with_capacity(packets.len());
        for (i, packet) in packets.into_iter().enumerate() {
            list_packets.insert(format!("Packet{}", i + 1), packet);
        }
        Self {
            imei: imei.into(),
            message,
            data_packets: list_packets.len() as i64,
            list_packets,
        }
    }

    /// §8 invariant: `IMEI` non-empty and at least one packet present.
    pub fn is_well_formed(&self) -> bool {
        !self.imei.is_empty() && !self.list_packets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn new_keys_packets_in_insertion_order() {
        let envelope = JonoEnvelope::new("869436050102345", None, vec![Packet::blank(), Packet::blank()]);
        let keys: Vec<&String> = envelope.list_packets.keys().collect();
        assert_eq!(keys, vec!["Packet1", "Packet2"]);
        assert_eq!(envelope.data_packets, 2);
        assert!(envelope.is_well_formed());
    }

    #[test]
    fn envelope_serializes_with_contract_casing() {
        let envelope = JonoEnvelope::new("869436050102345", None, vec![Packet::blank()]);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["IMEI"], "869436050102345");
        assert_eq!(json["DataPackets"], 1);
        assert!(json["ListPackets"]["Packet1"].is_object());
    }
}
