//! Typed configuration sections.

use alloy_primitives::{Address, Bytes};
use serde::Deserialize;

/// Root configuration for the provider service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub transport: TransportConfig,
	pub ledger: LedgerConfig,
	pub pinning: PinningConfig,
	pub provider: ProviderSection,
	#[serde(default)]
	pub notifier: NotifierConfig,
}

/// Pub/sub transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
	/// Base URL of the IPFS HTTP API.
	pub api_url: String,
	/// Shared broadcast topic all parties publish on.
	pub topic: String,
	/// Our own peer identity, used to drop self-published messages.
	pub own_peer_id: String,
	/// Peer identity of the computation agent.
	pub agent_peer_id: String,
}

/// Ledger (EVM JSON-RPC) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
	pub rpc_url: String,
	pub chain_id: u64,
	/// Operating key used to sign and submit transactions.
	pub provider_key: String,
	/// Dedicated key that signs finalize digests. Distinct from the
	/// operating key.
	pub oracle_key: String,
	/// Lighthouse contract that creates and finalizes liabilities.
	pub lighthouse: Address,
	/// Reward token contract minted to demanders.
	pub reward_contract: Address,
	#[serde(default = "default_gas_limit")]
	pub gas_limit: u64,
	#[serde(default = "default_request_timeout")]
	pub request_timeout_secs: u64,
}

/// Content pinning and gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PinningConfig {
	/// IPFS HTTP API used to list result directories.
	pub ipfs_api_url: String,
	/// Public gateway prefix used to build token URIs.
	pub gateway: String,
	pub pinata_api_key: String,
	pub pinata_secret_api_key: String,
}

/// Matching identity of this provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
	/// Model identifier this provider serves; demands for other models are
	/// ignored.
	pub model: Bytes,
	/// Display name stamped into reward metadata.
	#[serde(default = "default_reward_name")]
	pub reward_name: String,
	/// Image file looked up under the result directory when building
	/// metadata.
	#[serde(default = "default_image_file")]
	pub image_file: String,
}

/// Reward notifier retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
	#[serde(default = "default_notifier_period")]
	pub period_secs: u64,
	#[serde(default = "default_notifier_attempts")]
	pub max_attempts: u32,
}

impl Default for NotifierConfig {
	fn default() -> Self {
		Self {
			period_secs: default_notifier_period(),
			max_attempts: default_notifier_attempts(),
		}
	}
}

fn default_gas_limit() -> u64 {
	1_000_000_000
}

fn default_request_timeout() -> u64 {
	30
}

fn default_reward_name() -> String {
	"SpotNFT".to_string()
}

fn default_image_file() -> String {
	"AUSTIN.jpg".to_string()
}

fn default_notifier_period() -> u64 {
	5
}

fn default_notifier_attempts() -> u32 {
	10
}
