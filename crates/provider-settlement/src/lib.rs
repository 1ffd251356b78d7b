//! Settlement manager: owns the liability lifecycle.
//!
//! A matched (demand, offer) pair is settled in three ledger steps:
//! create the liability, finalize it with the computation result, and mint
//! the reward token. A bounded notification-retry loop then announces the
//! reward until the demander acknowledges it.

use alloy_primitives::Address;
use thiserror::Error;

use provider_ledger::LedgerError;
use provider_pinning::PinningError;
use provider_transport::TransportError;

pub mod codec;
pub mod manager;
pub mod notifier;
pub mod types;

pub use manager::{SettlementConfig, SettlementManager};
pub use notifier::{spawn_reward_notifier, NotifierHandle, NotifierSettings};
pub use types::{ComputationResult, Liability, SessionPhase};

/// Errors raised while driving a settlement sequence.
#[derive(Debug, Error)]
pub enum SettlementError {
	#[error("Ledger call failed: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Pinning failed: {0}")]
	Pinning(#[from] PinningError),

	#[error("Transport failed: {0}")]
	Transport(#[from] TransportError),

	#[error("Receipt missing expected log entry: {0}")]
	MalformedReceipt(String),

	#[error("No liability in flight for result {0}")]
	NoSession(String),

	#[error("Liability {0} is not awaiting finalization")]
	AlreadyFinalized(Address),
}
