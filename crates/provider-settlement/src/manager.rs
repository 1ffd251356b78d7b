//! The settlement state machine.
//!
//! One session is in flight at a time:
//! `Idle → Creating → Created → Finalizing → Finalized → Minting → Minted`,
//! with `Halted` for a session whose ledger step failed permanently.
//! Ledger calls go through a bounded exponential-backoff retry; only
//! transient failures (network, receipt timeout) are retried.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use backoff::ExponentialBackoffBuilder;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use provider_ledger::{contracts, LedgerClient, LedgerError, OracleSigner};
use provider_pinning::{PinningClient, RewardMetadata, StorageClient};
use provider_transport::Transport;
use provider_types::{ContractCall, Intent, Receipt, ResultNotice, TopicMessage};

use crate::codec;
use crate::notifier::{spawn_reward_notifier, NotifierHandle, NotifierSettings};
use crate::types::{ComputationResult, Liability, SessionPhase};
use crate::SettlementError;

/// Receipt position of the new liability address: log index 2, topic 1.
const LIABILITY_LOG_INDEX: usize = 2;
const LIABILITY_TOPIC: usize = 1;

/// Receipt position of the minted token id: log index 0, topic 3.
const TOKEN_LOG_INDEX: usize = 0;
const TOKEN_TOPIC: usize = 3;

/// Settlement configuration.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
	/// Lighthouse contract that creates and finalizes liabilities.
	pub lighthouse: Address,
	/// Reward token contract.
	pub reward_contract: Address,
	/// Gas budget per ledger call.
	pub gas_limit: u64,
	/// Public gateway prefix for token URIs.
	pub gateway: String,
	/// Name stamped into reward metadata.
	pub reward_name: String,
	/// Image file looked up under the result directory.
	pub image_file: String,
	/// Reward notifier retry budget.
	pub notifier: NotifierSettings,
	/// Total elapsed budget for retrying one transient ledger failure.
	pub retry_budget: Duration,
}

#[derive(Default)]
struct Session {
	phase: SessionPhase,
	liability: Option<Liability>,
}

/// Owns the liability lifecycle and the reward notification loop.
pub struct SettlementManager {
	ledger: Arc<dyn LedgerClient>,
	oracle: Arc<dyn OracleSigner>,
	storage: Arc<dyn StorageClient>,
	pinning: Arc<dyn PinningClient>,
	transport: Arc<dyn Transport>,
	topic: String,
	config: SettlementConfig,
	session: Mutex<Session>,
	notifier: Mutex<Option<NotifierHandle>>,
}

impl SettlementManager {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		oracle: Arc<dyn OracleSigner>,
		storage: Arc<dyn StorageClient>,
		pinning: Arc<dyn PinningClient>,
		transport: Arc<dyn Transport>,
		topic: String,
		config: SettlementConfig,
	) -> Self {
		Self {
			ledger,
			oracle,
			storage,
			pinning,
			transport,
			topic,
			config,
			session: Mutex::new(Session::default()),
			notifier: Mutex::new(None),
		}
	}

	/// Current session phase.
	pub async fn phase(&self) -> SessionPhase {
		self.session.lock().await.phase
	}

	/// Address of the liability in flight, if one exists.
	pub async fn current_liability(&self) -> Option<Address> {
		self.session
			.lock()
			.await
			.liability
			.as_ref()
			.map(|liability| liability.address)
	}

	/// Creates the escrow for a matched pair and returns its assigned
	/// address, checksummed for display by the caller.
	pub async fn create_liability(
		&self,
		demand: Intent,
		offer: Intent,
	) -> Result<Address, SettlementError> {
		{
			let mut session = self.session.lock().await;
			if !session.phase.is_terminal() {
				warn!(
					"Starting a new settlement while previous session is {:?}",
					session.phase
				);
			}
			session.phase = SessionPhase::Creating;
			session.liability = None;
		}

		let calldata = contracts::create_liability(
			codec::encode_demand(&demand),
			codec::encode_offer(&offer),
		);

		let receipt = match self.submit_with_retry(self.config.lighthouse, calldata).await {
			Ok(receipt) => receipt,
			Err(e) => {
				self.halt(&format!("createLiability: {}", e)).await;
				return Err(e.into());
			}
		};

		let Some(address) = receipt.address_topic(LIABILITY_LOG_INDEX, LIABILITY_TOPIC) else {
			let reason = format!(
				"createLiability receipt {} lacks log {} topic {}",
				receipt.transaction_hash, LIABILITY_LOG_INDEX, LIABILITY_TOPIC
			);
			self.halt(&reason).await;
			return Err(SettlementError::MalformedReceipt(reason));
		};

		info!("Liability created at {}", address.to_checksum(None));

		let mut session = self.session.lock().await;
		session.liability = Some(Liability {
			address,
			demand,
			offer,
		});
		session.phase = SessionPhase::Created;

		Ok(address)
	}

	/// Consumes an inbound computation result: finalizes the liability,
	/// then mints the reward.
	///
	/// A liability is finalized exactly once; a result arriving for a
	/// session that is not awaiting finalization is dropped.
	pub async fn handle_result(&self, notice: ResultNotice) -> Result<(), SettlementError> {
		let result = {
			let session = self.session.lock().await;
			let Some(liability) = session.liability.as_ref() else {
				warn!("Dropping result {}: no liability in flight", notice.result);
				return Err(SettlementError::NoSession(notice.result));
			};
			if session.phase != SessionPhase::Created {
				warn!(
					"Dropping result {}: liability {} is {:?}, not awaiting finalization",
					notice.result,
					liability.address,
					session.phase
				);
				return Err(SettlementError::AlreadyFinalized(liability.address));
			}
			ComputationResult {
				liability: liability.address,
				payload: notice.result,
				success: notice.success,
			}
		};

		self.finalize_liability(&result).await?;
		self.mint_reward(&result).await?;
		Ok(())
	}

	/// Finalizes the liability with the result payload and the oracle
	/// signature.
	///
	/// The `finalized` notification is published regardless of the ledger
	/// call's outcome.
	pub async fn finalize_liability(
		&self,
		result: &ComputationResult,
	) -> Result<(), SettlementError> {
		self.set_phase(SessionPhase::Finalizing).await;
		info!("Finalizing liability {}", result.liability);

		let payload = result.payload.as_bytes().to_vec();
		let digest = codec::finalize_digest(result.liability, &payload, result.success);

		let outcome: Result<(), LedgerError> = async {
			let signature = self.oracle.sign_digest(digest).await?;
			let calldata = contracts::finalize_liability(
				result.liability,
				payload.clone(),
				result.success,
				signature.to_vec(),
			);
			self.submit_with_retry(self.config.lighthouse, calldata)
				.await
				.map(|_| ())
		}
		.await;

		self.publish(TopicMessage::Finalized {
			liability: result.liability,
		})
		.await;

		match outcome {
			Ok(()) => {
				info!("Liability {} finalized", result.liability);
				self.set_phase(SessionPhase::Finalized).await;
				Ok(())
			}
			Err(e) => {
				self.halt(&format!("finalizeLiability: {}", e)).await;
				Err(e.into())
			}
		}
	}

	/// Mints the reward token to the original demander and starts the
	/// notification loop.
	pub async fn mint_reward(&self, result: &ComputationResult) -> Result<u64, SettlementError> {
		let recipient = {
			let session = self.session.lock().await;
			match session.liability.as_ref() {
				Some(liability) => liability.demand.sender,
				None => return Err(SettlementError::NoSession(result.payload.clone())),
			}
		};

		self.set_phase(SessionPhase::Minting).await;
		info!("Minting reward for liability {}", result.liability);

		match self.mint_reward_inner(result, recipient).await {
			Ok(token_id) => {
				self.set_phase(SessionPhase::Minted).await;
				info!(
					"Reward token {} minted to {}",
					token_id,
					recipient.to_checksum(None)
				);
				self.start_notifier(result.liability, token_id).await;
				Ok(token_id)
			}
			Err(e) => {
				self.halt(&format!("mintReward: {}", e)).await;
				Err(e)
			}
		}
	}

	async fn mint_reward_inner(
		&self,
		result: &ComputationResult,
		recipient: Address,
	) -> Result<u64, SettlementError> {
		let entries = self.storage.list_entries(&result.payload).await?;
		let first = entries.first().ok_or_else(|| {
			provider_pinning::PinningError::EmptyListing(result.payload.clone())
		})?;

		let metadata = RewardMetadata::from_listing(
			&self.config.gateway,
			first,
			&self.config.image_file,
			&self.config.reward_name,
		);
		let document = serde_json::to_value(&metadata)
			.map_err(|e| provider_pinning::PinningError::Decode(e.to_string()))?;
		let pinned = self.pinning.pin_json(&document).await?;
		let token_uri = format!("{}{}", self.config.gateway, pinned);
		debug!("Reward metadata pinned, token URI {}", token_uri);

		let calldata = contracts::mint_reward(recipient, token_uri);
		let receipt = self
			.submit_with_retry(self.config.reward_contract, calldata)
			.await?;

		let token_id = receipt
			.uint_topic(TOKEN_LOG_INDEX, TOKEN_TOPIC)
			.ok_or_else(|| {
				SettlementError::MalformedReceipt(format!(
					"mintReward receipt {} lacks log {} topic {}",
					receipt.transaction_hash, TOKEN_LOG_INDEX, TOKEN_TOPIC
				))
			})?;

		Ok(token_id.saturating_to())
	}

	/// Cancels the running reward notifier: the demander confirmed
	/// receipt.
	pub async fn acknowledge_reward(&self) {
		match self.notifier.lock().await.take() {
			Some(handle) => handle.acknowledge(),
			None => debug!("Reward acknowledgement with no notifier in flight"),
		}
	}

	async fn start_notifier(&self, liability: Address, token_id: u64) {
		let message = TopicMessage::RewardNotice {
			liability,
			reward_contract: self.config.reward_contract,
			token_id,
		};
		let handle = spawn_reward_notifier(
			self.transport.clone(),
			self.topic.clone(),
			message,
			self.config.notifier,
		);

		let mut slot = self.notifier.lock().await;
		if let Some(previous) = slot.replace(handle) {
			if !previous.is_finished() {
				warn!("Replacing an unfinished reward notifier");
			}
		}
	}

	/// Submits a call with a fresh pending nonce per attempt, retrying
	/// transient failures within the configured budget.
	async fn submit_with_retry(
		&self,
		to: Address,
		data: Vec<u8>,
	) -> Result<Receipt, LedgerError> {
		let policy = ExponentialBackoffBuilder::new()
			.with_max_elapsed_time(Some(self.config.retry_budget))
			.build();

		backoff::future::retry(policy, || {
			let data = data.clone();
			async move {
				let nonce = self
					.ledger
					.pending_nonce(self.ledger.operator())
					.await
					.map_err(to_backoff)?;
				let call = ContractCall {
					to,
					data,
					gas_limit: self.config.gas_limit,
					nonce,
				};
				self.ledger.submit_call(call).await.map_err(to_backoff)
			}
		})
		.await
	}

	async fn set_phase(&self, phase: SessionPhase) {
		self.session.lock().await.phase = phase;
	}

	async fn halt(&self, reason: &str) {
		error!("Settlement halted: {}", reason);
		self.session.lock().await.phase = SessionPhase::Halted;
	}

	async fn publish(&self, message: TopicMessage) {
		if let Err(e) = self.transport.publish(&self.topic, message.to_bytes()).await {
			warn!("Failed to publish notification: {}", e);
		}
	}
}

fn to_backoff(e: LedgerError) -> backoff::Error<LedgerError> {
	if e.is_retryable() {
		backoff::Error::transient(e)
	} else {
		backoff::Error::permanent(e)
	}
}
