//! # worker
//!
//! The Bridge Worker (C6): one [`Worker`] per protocol, modeled directly
//! on `uwb_hub::start_uwb_hub` + `process_packet` — a long-running
//! subscription loop, a per-message decode-dispatch-publish pipeline, and
//! "never crash the bridge" error handling (a malformed frame logs and
//! moves on, same as a malformed UWB packet does there).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use jono_types::record::IntermediateRecord;

use crate::assembler;
use crate::audit::{AuditEvent, AuditSink};
use crate::broker::{BrokerClient, BrokerMessage, Qos};
use crate::cache::DeviceCache;
use crate::codec;
use crate::config::BridgeConfig;
use crate::decoders::skywave::{InMemorySeenStore, SeenStore};
use crate::decoders::{self, DecodeError, DecodedFrame};
use crate::health::{CircuitBreaker, HealthMonitor};
use crate::plates::PlateLookup;
use crate::session::SessionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Meitrack,
    Huabao,
    Gt06,
    Bsj,
    Ruptela,
    Queclink,
    Suntech,
    Skywave,
}

impl Protocol {
    pub const ALL: [Protocol; 8] = [
        Protocol::Meitrack,
        Protocol::Huabao,
        Protocol::Gt06,
        Protocol::Bsj,
        Protocol::Ruptela,
        Protocol::Queclink,
        Protocol::Suntech,
        Protocol::Skywave,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Meitrack => "meitrack",
            Protocol::Huabao => "huabao",
            Protocol::Gt06 => "gt06",
            Protocol::Bsj => "bsj",
            Protocol::Ruptela => "ruptela",
            Protocol::Queclink => "queclink",
            Protocol::Suntech => "suntech",
            Protocol::Skywave => "skywave",
        }
    }

    /// GT06 and BSJ authenticate once per connection and reuse the
    /// endpoint binding for every later frame (§4.3); the ASCII protocols
    /// carry an IMEI on every frame and never need the Session Table.
    pub fn is_session_bound(&self) -> bool {
        matches!(self, Protocol::Gt06 | Protocol::Bsj)
    }
}

/// The JSON envelope a TCP-terminating listener publishes onto
/// `tracker/from-tcp` (§4.6, §6): `payload` is the frame, possibly
/// hex-encoded ASCII, and `remoteaddr` is the stable per-connection
/// endpoint the Session Table keys on.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FromTcpEnvelope {
    payload: String,
    remoteaddr: String,
}

/// One inbound frame normalized from either ingress topic: the
/// hex-decode-or-raw resolution (§1 line 35) already applied, and the
/// remote endpoint known only when the frame arrived on `tracker/from-tcp`
/// — UDP frames carry no envelope and so no stable endpoint to bind or
/// publish a `tracker/assign-imei2remoteaddr` record against.
struct RawFrame {
    remote_addr: Option<String>,
    payload: Vec<u8>,
}

/// One protocol's long-running worker: owns nothing that another
/// protocol's worker needs, except the broker, session table, and device
/// cache, which are shared process-wide (§5).
pub struct Worker {
    pub protocol: Protocol,
    broker: Arc<dyn BrokerClient>,
    sessions: Arc<SessionTable>,
    cache: Arc<DeviceCache>,
    audit: Arc<dyn AuditSink>,
    plates: Arc<dyn PlateLookup>,
    health: Arc<HealthMonitor>,
    circuit: CircuitBreaker,
    config: BridgeConfig,
    skywave_seen: Arc<dyn SeenStore>,
}

impl Worker {
    pub fn new(
        protocol: Protocol,
        broker: Arc<dyn BrokerClient>,
        sessions: Arc<SessionTable>,
        cache: Arc<DeviceCache>,
        audit: Arc<dyn AuditSink>,
        plates: Arc<dyn PlateLookup>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            protocol,
            broker,
            sessions,
            cache,
            audit,
            plates,
            health: Arc::new(HealthMonitor::new()),
            circuit: CircuitBreaker::new(5, Duration::from_secs(30)),
            config,
            skywave_seen: Arc::new(InMemorySeenStore::new()),
        }
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        self.health.clone()
    }

    const OUTPUT_TOPIC: &'static str = "tracker/jonoprotocol";
    const ASSIGN_TOPIC: &'static str = "tracker/assign-imei2remoteaddr";
    const INPUT_TCP_TOPIC: &'static str = "tracker/from-tcp";
    const INPUT_UDP_TOPIC: &'static str = "tracker/from-udp";

    /// Runs until `shutdown` fires. Every worker subscribes to both ingress
    /// topics (§4.6, §6): `tracker/from-tcp` carries the `{payload,
    /// remoteaddr}` envelope a TCP listener publishes, `tracker/from-udp`
    /// carries the bare datagram a UDP listener publishes. Same
    /// `loop { select! }` shape `uwb_hub::start_uwb_hub` uses for its UDP
    /// socket, swapped for two broker receives.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) {
        let mut tcp_sub = match self.broker.subscribe(Self::INPUT_TCP_TOPIC, Qos::AtLeastOnce).await {
            Ok(sub) => sub,
            Err(e) => {
                error!(protocol = self.protocol.name(), error = %e, "worker: failed to subscribe to tcp ingress, exiting");
                return;
            }
        };
        let mut udp_sub = match self.broker.subscribe(Self::INPUT_UDP_TOPIC, Qos::AtLeastOnce).await {
            Ok(sub) => sub,
            Err(e) => {
                error!(protocol = self.protocol.name(), error = %e, "worker: failed to subscribe to udp ingress, exiting");
                return;
            }
        };
        self.health.set_broker_connected(true);
        info!(protocol = self.protocol.name(), tcp = Self::INPUT_TCP_TOPIC, udp = Self::INPUT_UDP_TOPIC, "worker: subscribed");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(protocol = self.protocol.name(), "worker: shutdown requested");
                    break;
                }
                message = tcp_sub.recv() => {
                    match message {
                        Some(message) => self.handle_tcp_message(message).await,
                        None => {
                            warn!(protocol = self.protocol.name(), "worker: tcp ingress channel closed");
                            self.health.set_broker_connected(false);
                            break;
                        }
                    }
                }
                message = udp_sub.recv() => {
                    match message {
                        Some(message) => self.handle_udp_message(message).await,
                        None => {
                            warn!(protocol = self.protocol.name(), "worker: udp ingress channel closed");
                            self.health.set_broker_connected(false);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// `tracker/from-tcp` carries a JSON envelope so the remote endpoint
    /// (the Session Table key, and the target of `tracker/assign-
    /// imei2remoteaddr`) survives alongside the frame.
    async fn handle_tcp_message(&self, message: BrokerMessage) {
        let envelope: FromTcpEnvelope = match serde_json::from_slice(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(protocol = self.protocol.name(), error = %e, "worker: malformed tcp ingress envelope");
                self.health.record_error();
                return;
            }
        };
        let payload = codec::resolve_ingress_payload(envelope.payload.as_bytes());
        let raw = RawFrame { remote_addr: Some(envelope.remoteaddr), payload };
        self.handle_raw_frame(raw).await;
    }

    /// `tracker/from-udp` carries the datagram with no envelope at all — a
    /// UDP listener has no stable per-device connection to report a
    /// `remoteaddr` for (§4.6).
    async fn handle_udp_message(&self, message: BrokerMessage) {
        let payload = codec::resolve_ingress_payload(&message.payload);
        let raw = RawFrame { remote_addr: None, payload };
        self.handle_raw_frame(raw).await;
    }

    async fn handle_raw_frame(&self, raw: RawFrame) {
        match self.decode(&raw) {
            Ok(frames) => {
                self.health.record_message();
                for frame in frames {
                    self.publish_response(raw.remote_addr.as_deref(), &frame).await;
                    if let Some(record) = &frame.record {
                        self.publish_record(record, raw.remote_addr.as_deref()).await;
                    }
                }
            }
            Err(e) => {
                warn!(protocol = self.protocol.name(), remote = ?raw.remote_addr, error = %e, "worker: decode failed, dropping frame");
                self.health.record_error();
            }
        }
    }

    /// Decodes one raw frame into zero or more [`DecodedFrame`]s — many
    /// only for Skywave's batched XML poll response, exactly one for
    /// every connection-oriented protocol.
    fn decode(&self, raw: &RawFrame) -> Result<Vec<DecodedFrame>, DecodeError> {
        let session_imei = raw.remote_addr.as_deref().and_then(|addr| self.sessions.imei_for(addr));

        let as_text = |payload: &[u8]| {
            std::str::from_utf8(payload).map_err(|_| DecodeError::MalformedField("not valid UTF-8".into()))
        };

        let frame = match self.protocol {
            Protocol::Meitrack => decoders::meitrack::decode(as_text(&raw.payload)?)?,
            Protocol::Huabao => decoders::huabao::decode(as_text(&raw.payload)?)?,
            Protocol::Gt06 => decoders::gt06::decode(&raw.payload, session_imei.as_deref())?,
            Protocol::Bsj => decoders::bsj::decode(&raw.payload, session_imei.as_deref())?,
            Protocol::Ruptela => decoders::ruptela::decode(&raw.payload)?,
            Protocol::Queclink => decoders::queclink::decode(as_text(&raw.payload)?)?,
            Protocol::Suntech => decoders::suntech::decode(as_text(&raw.payload)?)?,
            Protocol::Skywave => {
                let records = decoders::skywave::decode_document(as_text(&raw.payload)?, self.skywave_seen.as_ref())?;
                return Ok(records.into_iter().map(DecodedFrame::record_only).collect());
            }
        };

        if self.protocol.is_session_bound() {
            if let (Some(remote_addr), Some(imei)) = (raw.remote_addr.as_deref(), frame.record.as_ref().and_then(|r| r.imei.as_ref())) {
                self.sessions.bind(remote_addr, imei);
            }
        }

        Ok(vec![frame])
    }

    async fn publish_response(&self, remote_addr: Option<&str>, frame: &DecodedFrame) {
        let Some(response) = &frame.response else { return };
        let Some(remote_addr) = remote_addr else { return };
        let topic = format!("tracker/send/{remote_addr}");
        if let Err(e) = self.broker.publish(&topic, response, Qos::AtLeastOnce).await {
            debug!(protocol = self.protocol.name(), error = %e, "worker: no listener for response topic (device disconnected?)");
        }
    }

    /// Publishes the canonical envelope, then — only for TCP-sourced frames
    /// with a resolved IMEI — the `tracker/assign-imei2remoteaddr` binding
    /// record (§4.6 line 155, §6 line 196) that lets the outer routing
    /// layer address this device directly. UDP frames carry no remote
    /// endpoint and so never emit a binding.
    async fn publish_record(&self, record: &IntermediateRecord, remote_addr: Option<&str>) {
        let envelope = assembler::assemble(record, &self.cache);
        if !envelope.is_well_formed() {
            debug!(protocol = self.protocol.name(), "worker: skipping publish of ill-formed envelope");
            return;
        }

        if !self.circuit.allow() {
            warn!(protocol = self.protocol.name(), "worker: circuit open, dropping publish");
            return;
        }

        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(protocol = self.protocol.name(), error = %e, "worker: failed to serialize envelope");
                self.circuit.record_failure();
                return;
            }
        };

        match self.broker.publish(Self::OUTPUT_TOPIC, &payload, Qos::AtLeastOnce).await {
            Ok(()) => self.circuit.record_success(),
            Err(e) => {
                warn!(protocol = self.protocol.name(), error = %e, "worker: publish failed");
                self.circuit.record_failure();
                return;
            }
        }

        if let Some(remote_addr) = remote_addr {
            let assignment = serde_json::json!({
                "imei": envelope.imei,
                "protocol": self.protocol.name(),
                "remoteaddr": remote_addr,
            });
            match serde_json::to_vec(&assignment) {
                Ok(payload) => {
                    if let Err(e) = self.broker.publish(Self::ASSIGN_TOPIC, &payload, Qos::AtLeastOnce).await {
                        warn!(protocol = self.protocol.name(), error = %e, "worker: assign-imei2remoteaddr publish failed");
                    }
                }
                Err(e) => error!(protocol = self.protocol.name(), error = %e, "worker: failed to serialize assign-imei2remoteaddr"),
            }
        }

        let plate_info = self.plates.lookup(&envelope.imei).await;
        let now = chrono::Utc::now();
        self.audit
            .record(&AuditEvent {
                client: self.config.mqtt_client_id(self.protocol.name(), now.timestamp()),
                imei: envelope.imei.clone(),
                protocol: self.protocol.name().to_string(),
                timestamp: now,
                payload: serde_json::json!({"plate": plate_info.plate, "spoofedImei": plate_info.spoofed_imei}),
            })
            .await;
    }
}
