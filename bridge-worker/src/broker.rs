//! # broker
//!
//! Broker client abstraction (§4 of SPEC_FULL, needed to make the bridge
//! worker testable): the real MQTT client is an external collaborator
//! (§1), injected the same way `backend-rust` injects `AuthEngine`/
//! `SocketIo` into `on_connect` rather than constructing them inline.
//! `ChannelBroker` is the in-memory stand-in the worker's own tests and
//! the default binary use.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("no subscriber for topic {0}")]
    NoSubscriber(String),
    #[error("publish channel closed for topic {0}")]
    ChannelClosed(String),
}

pub struct BrokerSubscription {
    pub receiver: mpsc::Receiver<BrokerMessage>,
}

impl BrokerSubscription {
    pub async fn recv(&mut self) -> Option<BrokerMessage> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> Result<(), BrokerError>;
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<BrokerSubscription, BrokerError>;
}

/// In-process broker: every `subscribe` registers a channel sender under
/// its topic, every `publish` fans the payload out to every sender
/// currently registered for that topic. QoS is accepted but not enforced
/// — there is no network to lose a delivery over.
#[derive(Default)]
pub struct ChannelBroker {
    topics: DashMap<String, Vec<mpsc::Sender<BrokerMessage>>>,
}

impl ChannelBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl BrokerClient for ChannelBroker {
    async fn publish(&self, topic: &str, payload: &[u8], _qos: Qos) -> Result<(), BrokerError> {
        let Some(senders) = self.topics.get(topic) else {
            return Err(BrokerError::NoSubscriber(topic.to_string()));
        };
        let message = BrokerMessage { topic: topic.to_string(), payload: payload.to_vec() };
        for sender in senders.iter() {
            if sender.send(message.clone()).await.is_err() {
                return Err(BrokerError::ChannelClosed(topic.to_string()));
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: Qos) -> Result<BrokerSubscription, BrokerError> {
        let (tx, rx) = mpsc::channel(256);
        self.topics.entry(topic.to_string()).or_default().push(tx);
        Ok(BrokerSubscription { receiver: rx })
    }
}
