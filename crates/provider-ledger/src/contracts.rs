//! Calldata builders for the lighthouse and reward contracts.

use alloy_primitives::Address;
use alloy_sol_types::{sol, SolCall};

sol! {
	/// Lighthouse contract: creates and finalizes liabilities.
	interface ILighthouse {
		function createLiability(bytes demand, bytes offer) external;
		function finalizeLiability(address liability, bytes result, bool success, bytes signature) external;
	}

	/// Reward token contract minted to the original demander.
	interface IRewardToken {
		function mintReward(address recipient, string tokenURI) external;
	}
}

/// Calldata for `createLiability(demandTuple, offerTuple)`.
pub fn create_liability(demand: Vec<u8>, offer: Vec<u8>) -> Vec<u8> {
	ILighthouse::createLiabilityCall {
		demand: demand.into(),
		offer: offer.into(),
	}
	.abi_encode()
}

/// Calldata for `finalizeLiability(address, payload, success, signature)`.
pub fn finalize_liability(
	liability: Address,
	result: Vec<u8>,
	success: bool,
	signature: Vec<u8>,
) -> Vec<u8> {
	ILighthouse::finalizeLiabilityCall {
		liability,
		result: result.into(),
		success,
		signature: signature.into(),
	}
	.abi_encode()
}

/// Calldata for `mintReward(recipient, tokenURI)`.
pub fn mint_reward(recipient: Address, token_uri: String) -> Vec<u8> {
	IRewardToken::mintRewardCall {
		recipient,
		tokenURI: token_uri,
	}
	.abi_encode()
}
