//! Settlement session types.

use alloy_primitives::Address;
use provider_types::Intent;

/// Progress of the single in-flight settlement session.
///
/// Any ledger step that fails permanently parks the session in `Halted`;
/// the matching loop keeps running and a later pairing starts a fresh
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
	#[default]
	Idle,
	Creating,
	Created,
	Finalizing,
	Finalized,
	Minting,
	Minted,
	Halted,
}

impl SessionPhase {
	/// Whether a new settlement sequence may begin from this phase.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			SessionPhase::Idle | SessionPhase::Minted | SessionPhase::Halted
		)
	}
}

/// The on-chain escrow instance created for one matched pair.
#[derive(Debug, Clone)]
pub struct Liability {
	/// Address assigned by the ledger upon creation.
	pub address: Address,
	pub demand: Intent,
	pub offer: Intent,
}

/// A computation outcome ready to finalize its liability.
#[derive(Debug, Clone)]
pub struct ComputationResult {
	/// Address of the liability being finalized.
	pub liability: Address,
	/// Content hash of the produced artifacts; its UTF-8 bytes are the
	/// finalize payload.
	pub payload: String,
	pub success: bool,
}
