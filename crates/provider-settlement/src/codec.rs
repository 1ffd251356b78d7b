//! ABI codec for the lighthouse matching protocol.
//!
//! Demand and offer are each encoded as a ten-field parameter tuple. The
//! two role addresses are ordered `(lighthouse, validator)` in the demand
//! tuple and `(validator, lighthouse)` in the offer tuple; this swap is a
//! protocol convention of the matching contract, and the on-chain decoder
//! silently transposes the roles if either side deviates from it.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;

use provider_types::Intent;

/// `(model, objective, token, cost, lighthouse, validator, validatorFee,
/// deadline, sender, signature)`
pub fn encode_demand(demand: &Intent) -> Vec<u8> {
	(
		demand.model.clone(),
		demand.objective.clone(),
		demand.token,
		demand.cost,
		demand.lighthouse,
		demand.validator,
		demand.fee,
		U256::from(demand.deadline),
		demand.sender,
		demand.signature.clone(),
	)
		.abi_encode_params()
}

/// `(model, objective, token, cost, validator, lighthouse, lighthouseFee,
/// deadline, sender, signature)`, with the role addresses transposed.
pub fn encode_offer(offer: &Intent) -> Vec<u8> {
	(
		offer.model.clone(),
		offer.objective.clone(),
		offer.token,
		offer.cost,
		offer.validator,
		offer.lighthouse,
		offer.fee,
		U256::from(offer.deadline),
		offer.sender,
		offer.signature.clone(),
	)
		.abi_encode_params()
}

/// Tight (unpadded, type-tagged) hash over `(liability, payload, success)`
/// that the oracle key signs for finalization.
pub fn finalize_digest(liability: Address, payload: &[u8], success: bool) -> B256 {
	let mut packed = Vec::with_capacity(21 + payload.len());
	packed.extend_from_slice(liability.as_slice());
	packed.extend_from_slice(payload);
	packed.push(success as u8);
	keccak256(&packed)
}
