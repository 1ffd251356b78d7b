//! Ledger boundary for the provider.
//!
//! The settlement manager drives the liability lifecycle exclusively through
//! [`LedgerClient`] and [`OracleSigner`]; the production implementation is a
//! JSON-RPC client with local-key signing (see [`implementations::rpc`]).

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use thiserror::Error;

use provider_types::{ContractCall, Receipt};

pub mod contracts;
pub mod signer;

pub mod implementations {
	pub mod rpc;
}

pub use implementations::rpc::RpcLedger;
pub use signer::LocalWallet;

/// Errors raised at the ledger boundary.
///
/// [`LedgerError::is_retryable`] is the contract the settlement manager's
/// bounded-retry policy relies on: transient transport conditions are
/// retried with backoff, everything else halts the session.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Transport-level failure (connection refused, request timeout).
	#[error("Network error: {0}")]
	Network(String),

	/// The node answered with a JSON-RPC error object.
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },

	/// The transaction was mined but reverted.
	#[error("Transaction reverted: {0}")]
	Reverted(String),

	/// The transaction was submitted but no receipt appeared in time.
	#[error("Timed out waiting for receipt of {0}")]
	ReceiptTimeout(String),

	/// Key or signature failure.
	#[error("Signing failed: {0}")]
	Signing(String),

	/// A response could not be decoded.
	#[error("Codec error: {0}")]
	Codec(String),
}

impl LedgerError {
	/// Whether the settlement layer may retry the call that produced this
	/// error.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			LedgerError::Network(_) | LedgerError::ReceiptTimeout(_)
		)
	}
}

/// Read and write access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
	/// Current chain height.
	async fn block_number(&self) -> Result<u64, LedgerError>;

	/// Pending transaction count for an account, used as the explicit nonce
	/// of the next call.
	async fn pending_nonce(&self, address: Address) -> Result<u64, LedgerError>;

	/// Signs, submits, and awaits the receipt of a contract call.
	async fn submit_call(&self, call: ContractCall) -> Result<Receipt, LedgerError>;

	/// Address of the operating account submitting calls.
	fn operator(&self) -> Address;
}

/// Signer for finalize digests, backed by the dedicated oracle key.
#[async_trait]
pub trait OracleSigner: Send + Sync {
	/// Address corresponding to the oracle key.
	fn address(&self) -> Address;

	/// EIP-191 signature over the digest, as 65 bytes (r ‖ s ‖ v).
	async fn sign_digest(&self, digest: B256) -> Result<Bytes, LedgerError>;
}
