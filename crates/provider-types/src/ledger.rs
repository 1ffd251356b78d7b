//! Ledger call and receipt types shared between the ledger client and the
//! settlement manager.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A contract call ready for submission.
///
/// The nonce is read explicitly (pending count) by the caller rather than
/// filled in by the ledger client, so sequencing stays visible at the
/// settlement layer.
#[derive(Debug, Clone)]
pub struct ContractCall {
	/// Target contract address.
	pub to: Address,
	/// ABI-encoded calldata (selector + arguments).
	pub data: Vec<u8>,
	/// Explicit gas budget.
	pub gas_limit: u64,
	/// Explicit nonce, read as the sender's pending transaction count.
	pub nonce: u64,
}

/// A mined transaction receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
	/// Hash of the mined transaction.
	pub transaction_hash: B256,
	/// Block the transaction was included in.
	pub block_number: u64,
	/// Execution status (false means reverted).
	pub status: bool,
	/// Emitted event logs, in emission order.
	pub logs: Vec<LogEntry>,
}

/// A single emitted event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
	/// Emitting contract.
	pub address: Address,
	/// Indexed topics; topic 0 is the event signature.
	pub topics: Vec<B256>,
	/// Unindexed data.
	pub data: Bytes,
}

impl Receipt {
	/// Reads an address out of an indexed topic (lower 20 bytes of the
	/// 32-byte word).
	pub fn address_topic(&self, log_index: usize, topic_index: usize) -> Option<Address> {
		let topic = self.logs.get(log_index)?.topics.get(topic_index)?;
		Some(Address::from_slice(&topic[12..]))
	}

	/// Reads a uint out of an indexed topic.
	pub fn uint_topic(&self, log_index: usize, topic_index: usize) -> Option<U256> {
		let topic = self.logs.get(log_index)?.topics.get(topic_index)?;
		Some(U256::from_be_bytes(topic.0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn topic_extraction() {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(&[0xabu8; 20]);
		let receipt = Receipt {
			transaction_hash: B256::ZERO,
			block_number: 1,
			status: true,
			logs: vec![LogEntry {
				address: Address::ZERO,
				topics: vec![B256::ZERO, B256::from(word)],
				data: Bytes::new(),
			}],
		};

		assert_eq!(
			receipt.address_topic(0, 1),
			Some(Address::from([0xabu8; 20]))
		);
		assert_eq!(receipt.address_topic(0, 2), None);
		assert_eq!(receipt.address_topic(2, 1), None);
	}

	#[test]
	fn uint_topic_big_endian() {
		let receipt = Receipt {
			transaction_hash: B256::ZERO,
			block_number: 1,
			status: true,
			logs: vec![LogEntry {
				address: Address::ZERO,
				topics: vec![B256::ZERO, B256::ZERO, B256::ZERO, B256::from(U256::from(42u64))],
				data: Bytes::new(),
			}],
		};

		assert_eq!(receipt.uint_topic(0, 3), Some(U256::from(42u64)));
	}
}
