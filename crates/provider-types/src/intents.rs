//! Intent types for the provider system.
//!
//! A demand and an offer share the same ten-field shape; they differ only in
//! which party's fee they carry and in how their role addresses are ordered
//! when ABI-encoded for the lighthouse contract (see
//! `provider-settlement::codec`).

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Which side of a match an intent represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
	/// Published by a consumer asking for a task to be executed.
	Demand,
	/// Published by the computation agent willing to execute it.
	Offer,
}

/// A signed intent to consume or provide a computation task.
///
/// `fee` is the validator fee on a demand and the lighthouse fee on an
/// offer; the wire field name differs accordingly (`validatorFee` /
/// `lighthouseFee`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
	/// Opaque identifier of the requested task/model.
	pub model: Bytes,
	/// Opaque objective payload, matched byte-for-byte against the
	/// counterparty.
	pub objective: Bytes,
	/// Payment token address.
	pub token: Address,
	/// Cost in payment-token units.
	pub cost: U256,
	/// Lighthouse contract address this intent is routed through.
	pub lighthouse: Address,
	/// Validator role address.
	pub validator: Address,
	/// Role-dependent fee (validator fee for demands, lighthouse fee for
	/// offers).
	pub fee: U256,
	/// Block height after which the intent is no longer valid. A demand's
	/// deadline is the binding expiry for matching.
	pub deadline: u64,
	/// Address that signed and published the intent.
	pub sender: Address,
	/// Sender's signature over the intent fields.
	pub signature: Bytes,
}

impl Intent {
	/// Whether this intent is still valid at the given block height.
	///
	/// Validity is checked at match time, not at receipt time.
	pub fn is_live_at(&self, height: u64) -> bool {
		self.deadline > height
	}

	/// Whether this intent and `other` agree on model and objective.
	pub fn matches(&self, other: &Intent) -> bool {
		self.model == other.model && self.objective == other.objective
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn intent(deadline: u64) -> Intent {
		Intent {
			model: Bytes::from(vec![0x11]),
			objective: Bytes::from(vec![0x22]),
			token: Address::from([1u8; 20]),
			cost: U256::from(10),
			lighthouse: Address::from([2u8; 20]),
			validator: Address::from([3u8; 20]),
			fee: U256::from(1),
			deadline,
			sender: Address::from([4u8; 20]),
			signature: Bytes::from(vec![0xaa; 65]),
		}
	}

	#[test]
	fn deadline_is_exclusive() {
		let i = intent(1000);
		assert!(i.is_live_at(999));
		assert!(!i.is_live_at(1000));
		assert!(!i.is_live_at(1001));
	}

	#[test]
	fn matches_on_model_and_objective_only() {
		let a = intent(1000);
		let mut b = intent(500);
		b.cost = U256::from(999);
		assert!(a.matches(&b));

		b.objective = Bytes::from(vec![0x23]);
		assert!(!a.matches(&b));
	}
}
