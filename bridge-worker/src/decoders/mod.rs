//! # decoders
//!
//! One module per wire protocol (§4.2). Every decoder turns a raw frame
//! plus the remote endpoint it arrived on into a [`DecodedFrame`] — an
//! [`jono_types::IntermediateRecord`] plus an optional response-bytes side
//! channel for session control (login ack, heartbeat ack, ...).
//!
//! Decoders never unify coordinate math, event-code tables, or framing —
//! each protocol keeps its own (§9 "Coordinate formulas differ per
//! protocol. Do not unify coordinate parsing").

pub mod bsj;
pub mod gt06;
pub mod huabao;
pub mod meitrack;
pub mod queclink;
pub mod ruptela;
pub mod skywave;
pub mod suntech;

use std::borrow::Cow;

use jono_types::record::IntermediateRecord;

/// A decoder's full output: the intermediate record for the assembler,
/// plus whatever response bytes (§4.3) the session state machine needs
/// published back to the device on `tracker/send`.
#[derive(Debug, Clone, Default)]
pub struct DecodedFrame {
    pub record: Option<IntermediateRecord>,
    pub response: Option<Vec<u8>>,
}

impl DecodedFrame {
    pub fn record_only(record: IntermediateRecord) -> Self {
        Self { record: Some(record), response: None }
    }

    pub fn response_only(response: Vec<u8>) -> Self {
        Self { record: None, response: Some(response) }
    }

    pub fn with_response(record: IntermediateRecord, response: Vec<u8>) -> Self {
        Self { record: Some(record), response: Some(response) }
    }
}

/// Taxonomy from §7: framing errors are the only ones that drop the whole
/// frame with no emission at all. Field-parse errors are handled inside
/// each decoder by emitting nulls, not by returning `Err`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame too short: got {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },
    #[error("bad sentinel: expected {expected:?}")]
    BadSentinel { expected: &'static str },
    #[error("checksum mismatch: computed {computed:#x}, frame had {frame:#x}")]
    ChecksumMismatch { computed: u32, frame: u32 },
    #[error("unrecognized message type {0:#x}")]
    UnrecognizedMessageType(u8),
    #[error("session error: {0}")]
    Session(&'static str),
    #[error("malformed field: {0}")]
    MalformedField(Cow<'static, str>),
}

/// §9's "capability set {GetIMEI, GetPackets, GetMessage}" — a decoder
/// result is always reducible to this much, regardless of protocol. Used
/// by the worker to decide whether a partial decode is still publishable
/// (§7 propagation policy: publish when IMEI and at least one packet are
/// populated, even after a field-parse error downstream).
pub trait FrameCapabilities {
    fn imei(&self) -> Option<&str>;
    fn has_packets(&self) -> bool;
}

impl FrameCapabilities for IntermediateRecord {
    fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }

    fn has_packets(&self) -> bool {
        !self.list_packets.is_empty() || !self.top_level.is_empty()
    }
}
