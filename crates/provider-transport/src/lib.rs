//! Pub/sub transport boundary for the provider.
//!
//! The matching engine only ever sees this trait; the production
//! implementation speaks the IPFS pubsub HTTP API
//! (see [`implementations::ipfs`]).

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod implementations {
	pub mod ipfs;
}

pub use implementations::ipfs::IpfsPubsub;

/// Errors that can occur at the transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
	/// The transport endpoint rejected or dropped the request.
	#[error("Connection error: {0}")]
	Connection(String),
	/// A delivered frame could not be decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The subscription stream ended and could not be resumed.
	#[error("Subscription closed: {0}")]
	SubscriptionClosed(String),
}

/// One message delivered by the broadcast channel, with sender identity
/// metadata.
#[derive(Debug, Clone)]
pub struct InboundMessage {
	/// Peer identity of the publisher.
	pub from: String,
	/// Raw payload bytes.
	pub data: Vec<u8>,
}

/// Broadcast transport: subscribe to a named topic and publish to it.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Publishes a raw payload to the topic.
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

	/// Subscribes to the topic, delivering messages one at a time until the
	/// returned receiver is dropped.
	async fn subscribe(
		&self,
		topic: &str,
	) -> Result<mpsc::Receiver<InboundMessage>, TransportError>;
}
