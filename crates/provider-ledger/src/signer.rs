//! Local-key signer used for both transaction submission and oracle
//! digest signing.

use alloy_primitives::{Address, Bytes, PrimitiveSignature, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

use crate::{LedgerError, OracleSigner};

/// Wallet holding one private key in memory.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex-encoded private key (with or without the 0x prefix).
	pub fn new(private_key_hex: &str) -> Result<Self, LedgerError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| LedgerError::Signing(format!("Invalid private key: {}", e)))?;
		Ok(Self { signer })
	}

	pub fn address(&self) -> Address {
		self.signer.address()
	}

	pub(crate) fn inner(&self) -> &PrivateKeySigner {
		&self.signer
	}
}

/// Standard Ethereum wire form of a signature: r ‖ s ‖ v with v ∈ {27, 28}.
pub fn signature_bytes(sig: &PrimitiveSignature) -> Bytes {
	let mut bytes = Vec::with_capacity(65);
	bytes.extend_from_slice(&sig.r().to_be_bytes::<32>());
	bytes.extend_from_slice(&sig.s().to_be_bytes::<32>());
	bytes.push(if sig.v() { 28 } else { 27 });
	Bytes::from(bytes)
}

#[async_trait]
impl OracleSigner for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_digest(&self, digest: B256) -> Result<Bytes, LedgerError> {
		// EIP-191 personal-sign over the 32-byte digest, matching what the
		// lighthouse contract recovers.
		let signature = self
			.signer
			.sign_message(digest.as_slice())
			.await
			.map_err(|e| LedgerError::Signing(e.to_string()))?;
		Ok(signature_bytes(&signature))
	}
}
