//! Matching engine for the provider.
//!
//! Consumes the shared pubsub topic, classifies each message by its
//! sender's role, pairs demand and offer intents on model and objective,
//! and hands matched pairs to the settlement layer.

pub mod engine;
pub mod session;

pub use engine::{MatchingEngine, Settlement};
pub use session::{MatchSession, PeerRoles, SenderRole};

use provider_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the matching run loop.
///
/// Per-message failures never reach this level; a malformed or
/// irrelevant message is dropped where it is classified.
#[derive(Debug, Error)]
pub enum MatchingError {
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Inbound subscription stream closed")]
	StreamClosed,
}
