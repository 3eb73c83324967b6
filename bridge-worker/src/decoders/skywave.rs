//! Globalstar SpotX (§4.2.8): poll-based XML over HTTP fetch, not
//! connection-oriented. One `decode_document` call processes a whole
//! `<getReturnMessagesResult>` response and returns one [`DecodedFrame`]
//! per new (not-yet-seen) `<message>`.
//!
//! The SQL dedup store itself is an external collaborator (§1); this
//! module only defines the seam ([`SeenStore`]) and a process-lifetime
//! in-memory default for tests and for deployments that don't need
//! cross-restart dedup.

use std::collections::HashSet;
use std::sync::Mutex;

use jono_types::record::{FieldMap, IntermediateRecord};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::json;

use crate::codec;
use crate::decoders::DecodeError;

/// Message-type catalog from §4.2.8; preserved verbatim as the `AlarmType`
/// string so the assembler's keyword/reverse-lookup fallback has
/// something to chew on for types the shared catalog doesn't know.
const MESSAGE_TYPES: &[&str] = &[
    "DistanceCell",
    "StationaryIntervalSat",
    "MovingIntervalSat",
    "MovingEnd",
    "MovingStart",
    "IgnitionOn",
    "StationaryIntervalCell",
];

/// `(id, messengerId) -> already published` dedup seam (§4.2.8).
pub trait SeenStore: Send + Sync {
    fn is_new(&self, id: &str, messenger_id: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemorySeenStore {
    seen: Mutex<HashSet<(String, String)>>,
}

impl InMemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenStore for InMemorySeenStore {
    fn is_new(&self, id: &str, messenger_id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert((id.to_string(), messenger_id.to_string()))
    }
}

/// Parses the packed `<degrees-with-sign><minutes*1000>` integer string
/// into decimal degrees (§4.1 spotx formula), then — for latitude only —
/// applies the empirical -0.003333 bias (§9 Open Question iv).
fn decode_coordinate(raw: &str, is_latitude: bool) -> Option<f64> {
    let decimal = codec::coords::spotx(raw)?;
    if is_latitude {
        Some(decimal - 0.003333)
    } else {
        Some(decimal)
    }
}

#[derive(Debug, Default, Clone)]
struct RawMessage {
    id: String,
    messenger_id: String,
    unix_time: String,
    message_type: String,
    latitude: String,
    longitude: String,
    altitude: String,
    date_time: String,
}

/// Reads one `<getReturnMessagesResult><messages><message>...` XML
/// document into its flat `<message>` elements. A tag-depth walk rather
/// than full `serde` deserialization, since the schema nests messages one
/// level under `<messages>` and quick-xml's event reader handles that
/// directly without an intermediate struct hierarchy.
fn parse_messages(xml: &str) -> Result<Vec<RawMessage>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<RawMessage> = None;
    let mut current_tag: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "message" {
                    current = Some(RawMessage::default());
                } else {
                    current_tag = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(msg), Some(tag)) = (current.as_mut(), current_tag.as_deref()) {
                    let text = t.unescape().unwrap_or_default().to_string();
                    match tag {
                        "id" => msg.id = text,
                        "messengerId" => msg.messenger_id = text,
                        "unixTime" => msg.unix_time = text,
                        "messageType" => msg.message_type = text,
                        "latitude" => msg.latitude = text,
                        "longitude" => msg.longitude = text,
                        "altitude" => msg.altitude = text,
                        "dateTime" => msg.date_time = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "message" {
                    if let Some(msg) = current.take() {
                        messages.push(msg);
                    }
                }
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DecodeError::MalformedField(format!("SpotX XML parse error: {e}").into())),
        }
        buf.clear();
    }
    Ok(messages)
}

/// Builds the Intermediate Record for one already-deduplicated message.
/// Addressed "to a companion server" per §4.2.8 as a synthetic
/// Meitrack-AAA-shaped frame, here represented simply by giving the
/// record `messengerId` as its IMEI — the publish/forward machinery that
/// actually addresses a companion server lives in the worker, not here.
fn build_record(msg: &RawMessage) -> IntermediateRecord {
    let mut fields = FieldMap::new();

    let lat = decode_coordinate(&msg.latitude, true);
    let lon = decode_coordinate(&msg.longitude, false);
    if let Some(lat) = lat {
        fields.insert("Latitude".to_string(), json!(lat));
    }
    if let Some(lon) = lon {
        fields.insert("Longitude".to_string(), json!(lon));
    }
    if let Ok(altitude) = msg.altitude.parse::<i64>() {
        fields.insert("Altitude".to_string(), json!(altitude));
    }

    let datetime = codec::datetime::parse(&msg.date_time).or_else(|| {
        msg.unix_time.parse::<i64>().ok().and_then(codec::datetime::from_unix_seconds)
    });
    if let Some(dt) = datetime {
        fields.insert("Datetime".to_string(), json!(dt.to_rfc3339()));
    }

    fields.insert("AlarmType".to_string(), json!(msg.message_type));
    fields.insert("PositioningStatus".to_string(), json!("A"));

    IntermediateRecord::single(msg.messenger_id.clone(), format!("spotx:{}", msg.id), fields)
}

/// Decodes one poll response, returning only the messages `store` hasn't
/// seen before (§4.2.8 "de-duplicate by (id, messengerId)").
pub fn decode_document(xml: &str, store: &dyn SeenStore) -> Result<Vec<IntermediateRecord>, DecodeError> {
    let messages = parse_messages(xml)?;
    Ok(messages
        .iter()
        .filter(|m| store.is_new(&m.id, &m.messenger_id))
        .map(build_record)
        .collect())
}

pub fn known_message_types() -> &'static [&'static str] {
    MESSAGE_TYPES
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<getReturnMessagesResult>
        <messages>
            <message>
                <id>1001</id>
                <messengerId>0-1234567</messengerId>
                <unixTime>1718269838</unixTime>
                <messageType>MovingStart</messageType>
                <latitude>1895027</latitude>
                <longitude>-9792288</longitude>
                <altitude>120</altitude>
                <dateTime>2024-06-13T09:10:38Z</dateTime>
            </message>
        </messages>
    </getReturnMessagesResult>"#;

    #[test]
    fn new_message_decodes_and_dedups_on_second_poll() {
        let store = InMemorySeenStore::new();
        let first = decode_document(SAMPLE_XML, &store).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].imei.as_deref(), Some("0-1234567"));

        let second = decode_document(SAMPLE_XML, &store).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn latitude_bias_is_subtracted_but_longitude_is_not() {
        let lat = decode_coordinate("1895027", true).unwrap();
        let lon = decode_coordinate("1895027", false).unwrap();
        assert_eq!(lon - lat, 0.003333);
    }

    #[test]
    fn known_message_types_include_every_documented_kind() {
        assert!(known_message_types().contains(&"StationaryIntervalCell"));
        assert!(known_message_types().contains(&"IgnitionOn"));
    }
}
