//! JSON-RPC ledger client.
//!
//! Signs legacy transactions with the local operating key, submits them
//! raw, and polls for the receipt with a bounded attempt budget. Every
//! request carries an explicit timeout so a stalled node surfaces as a
//! retryable [`LedgerError::Network`] instead of hanging the inbound
//! message stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use provider_types::{ContractCall, LogEntry, Receipt};

use crate::signer::LocalWallet;
use crate::{LedgerClient, LedgerError};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RECEIPT_MAX_ATTEMPTS: u32 = 60;

/// Ledger client over a single JSON-RPC endpoint.
pub struct RpcLedger {
	client: reqwest::Client,
	rpc_url: String,
	chain_id: u64,
	wallet: LocalWallet,
	request_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
	code: i64,
	message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
	status: Option<String>,
	block_number: Option<String>,
	transaction_hash: B256,
	#[serde(default)]
	logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
struct RpcLog {
	address: Address,
	topics: Vec<B256>,
	data: Bytes,
}

impl RpcLedger {
	pub fn new(
		rpc_url: impl Into<String>,
		chain_id: u64,
		wallet: LocalWallet,
		request_timeout: Duration,
	) -> Result<Self, LedgerError> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		Ok(Self {
			client,
			rpc_url: rpc_url.into(),
			chain_id,
			wallet,
			request_id: AtomicU64::new(1),
		})
	}

	async fn request<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, LedgerError> {
		let id = self.request_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(&self.rpc_url)
			.json(&body)
			.send()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?
			.error_for_status()
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		let parsed: RpcResponse<T> = response
			.json()
			.await
			.map_err(|e| LedgerError::Codec(e.to_string()))?;

		if let Some(error) = parsed.error {
			return Err(LedgerError::Rpc {
				code: error.code,
				message: error.message,
			});
		}

		parsed
			.result
			.ok_or_else(|| LedgerError::Codec(format!("{}: empty result", method)))
	}

	async fn quantity(&self, method: &str, params: Value) -> Result<u64, LedgerError> {
		let raw: String = self.request(method, params).await?;
		parse_quantity(&raw)
	}

	async fn gas_price(&self) -> Result<u128, LedgerError> {
		let raw: String = self.request("eth_gasPrice", json!([])).await?;
		u128::from_str_radix(raw.trim_start_matches("0x"), 16)
			.map_err(|e| LedgerError::Codec(format!("bad gas price {}: {}", raw, e)))
	}

	async fn send_raw(&self, raw: Vec<u8>) -> Result<B256, LedgerError> {
		self.request(
			"eth_sendRawTransaction",
			json!([format!("0x{}", hex::encode(raw))]),
		)
		.await
	}

	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, LedgerError> {
		for attempt in 1..=RECEIPT_MAX_ATTEMPTS {
			let receipt: Option<RpcReceipt> = self
				.request("eth_getTransactionReceipt", json!([tx_hash]))
				.await?;

			if let Some(receipt) = receipt {
				debug!(
					"Receipt for {} found after {} attempts",
					tx_hash, attempt
				);
				return Receipt::try_from(receipt);
			}

			tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
		}

		Err(LedgerError::ReceiptTimeout(tx_hash.to_string()))
	}
}

impl TryFrom<RpcReceipt> for Receipt {
	type Error = LedgerError;

	fn try_from(rpc: RpcReceipt) -> Result<Self, LedgerError> {
		let status = match rpc.status.as_deref() {
			Some(raw) => parse_quantity(raw)? == 1,
			// pre-Byzantium nodes omit status; assume success
			None => true,
		};
		let block_number = match rpc.block_number.as_deref() {
			Some(raw) => parse_quantity(raw)?,
			None => 0,
		};

		Ok(Receipt {
			transaction_hash: rpc.transaction_hash,
			block_number,
			status,
			logs: rpc
				.logs
				.into_iter()
				.map(|log| LogEntry {
					address: log.address,
					topics: log.topics,
					data: log.data,
				})
				.collect(),
		})
	}
}

#[async_trait]
impl LedgerClient for RpcLedger {
	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.quantity("eth_blockNumber", json!([])).await
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, LedgerError> {
		self.quantity(
			"eth_getTransactionCount",
			json!([address, "pending"]),
		)
		.await
	}

	async fn submit_call(&self, call: ContractCall) -> Result<Receipt, LedgerError> {
		let gas_price = self.gas_price().await?;

		let mut tx = TxLegacy {
			chain_id: Some(self.chain_id),
			nonce: call.nonce,
			gas_price,
			gas_limit: call.gas_limit,
			to: TxKind::Call(call.to),
			value: U256::ZERO,
			input: Bytes::from(call.data),
		};

		let signature = self
			.wallet
			.inner()
			.sign_transaction(&mut tx)
			.await
			.map_err(|e| LedgerError::Signing(e.to_string()))?;

		let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
		let tx_hash = self.send_raw(envelope.encoded_2718()).await?;

		info!("Submitted call to {} as {}", call.to, tx_hash);

		let receipt = self.wait_for_receipt(tx_hash).await?;
		if !receipt.status {
			warn!("Transaction {} reverted", tx_hash);
			return Err(LedgerError::Reverted(tx_hash.to_string()));
		}

		Ok(receipt)
	}

	fn operator(&self) -> Address {
		self.wallet.address()
	}
}

fn parse_quantity(raw: &str) -> Result<u64, LedgerError> {
	u64::from_str_radix(raw.trim_start_matches("0x"), 16)
		.map_err(|e| LedgerError::Codec(format!("bad quantity {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_quantities() {
		assert_eq!(parse_quantity("0x0").unwrap(), 0);
		assert_eq!(parse_quantity("0x3e8").unwrap(), 1000);
		assert!(parse_quantity("0xzz").is_err());
	}

	#[test]
	fn receipt_conversion_reads_status_and_logs() {
		let rpc = RpcReceipt {
			status: Some("0x1".to_string()),
			block_number: Some("0x10".to_string()),
			transaction_hash: B256::from([1u8; 32]),
			logs: vec![RpcLog {
				address: Address::from([2u8; 20]),
				topics: vec![B256::ZERO],
				data: Bytes::from(vec![1, 2, 3]),
			}],
		};

		let receipt = Receipt::try_from(rpc).unwrap();
		assert!(receipt.status);
		assert_eq!(receipt.block_number, 16);
		assert_eq!(receipt.logs.len(), 1);
	}

	#[test]
	fn reverted_status_is_false() {
		let rpc = RpcReceipt {
			status: Some("0x0".to_string()),
			block_number: Some("0x10".to_string()),
			transaction_hash: B256::ZERO,
			logs: vec![],
		};
		assert!(!Receipt::try_from(rpc).unwrap().status);
	}
}
