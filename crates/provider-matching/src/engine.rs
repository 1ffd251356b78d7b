//! Message dispatch and the pairing loop.

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use provider_ledger::LedgerClient;
use provider_settlement::{SettlementError, SettlementManager};
use provider_transport::Transport;
use provider_types::{Intent, ResultNotice, TopicMessage};

use crate::session::{MatchSession, PeerRoles, SenderRole};
use crate::MatchingError;

/// Settlement operations the engine drives.
#[async_trait]
pub trait Settlement: Send + Sync {
	async fn create_liability(
		&self,
		demand: Intent,
		offer: Intent,
	) -> Result<Address, SettlementError>;

	async fn handle_result(&self, notice: ResultNotice) -> Result<(), SettlementError>;

	async fn acknowledge_reward(&self);
}

#[async_trait]
impl Settlement for SettlementManager {
	async fn create_liability(
		&self,
		demand: Intent,
		offer: Intent,
	) -> Result<Address, SettlementError> {
		SettlementManager::create_liability(self, demand, offer).await
	}

	async fn handle_result(&self, notice: ResultNotice) -> Result<(), SettlementError> {
		SettlementManager::handle_result(self, notice).await
	}

	async fn acknowledge_reward(&self) {
		SettlementManager::acknowledge_reward(self).await
	}
}

/// Pairs inbound demand and offer intents and drives settlement.
///
/// Messages are handled one at a time by [`MatchingEngine::run`]; the
/// session slots are still guarded so that the offer is taken before
/// the first suspending settlement call.
pub struct MatchingEngine {
	transport: Arc<dyn Transport>,
	ledger: Arc<dyn LedgerClient>,
	settlement: Arc<dyn Settlement>,
	topic: String,
	model: Bytes,
	roles: PeerRoles,
	session: Mutex<MatchSession>,
}

impl MatchingEngine {
	pub fn new(
		transport: Arc<dyn Transport>,
		ledger: Arc<dyn LedgerClient>,
		settlement: Arc<dyn Settlement>,
		topic: String,
		model: Bytes,
		roles: PeerRoles,
	) -> Self {
		Self {
			transport,
			ledger,
			settlement,
			topic,
			model,
			roles,
			session: Mutex::new(MatchSession::default()),
		}
	}

	/// Subscribes to the topic and handles messages until shutdown.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MatchingError> {
		let mut inbound = self.transport.subscribe(&self.topic).await?;
		info!(
			"Matching engine listening on '{}' for model 0x{}",
			self.topic,
			hex::encode(&self.model)
		);

		loop {
			tokio::select! {
				message = inbound.recv() => match message {
					Some(message) => self.on_message(&message.from, &message.data).await,
					None => return Err(MatchingError::StreamClosed),
				},
				_ = shutdown.changed() => {
					info!("Matching engine stopping");
					return Ok(());
				}
			}
		}
	}

	/// Classifies one inbound message and updates session state.
	pub async fn on_message(&self, sender: &str, payload: &[u8]) {
		match self.roles.classify(sender) {
			SenderRole::Own => trace!("Ignoring own echo"),
			SenderRole::Agent => self.on_agent_message(payload).await,
			SenderRole::Other => self.on_peer_message(sender, payload).await,
		}
	}

	async fn on_agent_message(&self, payload: &[u8]) {
		match TopicMessage::classify(payload) {
			TopicMessage::Result(notice) => {
				info!("Result {} reported by agent", notice.result);
				if let Err(e) = self.settlement.handle_result(notice).await {
					warn!("Result not settled: {}", e);
				}
			}
			TopicMessage::QueueStatus(status) => {
				info!("Agent status: {}", status);
			}
			TopicMessage::Offer(offer) => {
				info!("Offer received for model 0x{}", hex::encode(&offer.model));
				self.session.lock().unwrap().offer = Some(offer);
				self.try_pair().await;
			}
			_ => debug!("Ignoring unhandled agent message"),
		}
	}

	async fn on_peer_message(&self, sender: &str, payload: &[u8]) {
		match TopicMessage::classify(payload) {
			TopicMessage::Demand(demand) => self.on_demand(demand, payload).await,
			TopicMessage::RewardAck => {
				info!("Reward acknowledged by {}", sender);
				self.settlement.acknowledge_reward().await;
			}
			_ => trace!("Ignoring peer chatter"),
		}
	}

	async fn on_demand(&self, demand: Intent, raw: &[u8]) {
		if demand.model != self.model {
			debug!(
				"Ignoring demand for foreign model 0x{}",
				hex::encode(&demand.model)
			);
			return;
		}

		let ack = TopicMessage::DemandAck {
			demand_sender: demand.sender,
			demand_objective: demand.objective.clone(),
		};

		let adopted = self.session.lock().unwrap().adopt_demand(demand.clone());
		if !adopted {
			// Retransmitted duplicate; the consumer may have missed the
			// first acknowledgement.
			self.publish(ack).await;
			return;
		}

		info!("Demand adopted from {}", demand.sender.to_checksum(None));
		// Echo the document as adopted, byte for byte; re-serializing the
		// parsed intent would drop fields it does not model.
		self.publish_raw(raw.to_vec()).await;
		self.publish(ack).await;
		self.try_pair().await;
	}

	/// Attempts to settle the held pair.
	///
	/// Validation and the offer take happen under one lock after the
	/// height read, so whatever pair is committed to settlement is the
	/// pair that was validated, and the slot is empty before the
	/// settlement call suspends. An unmatched or expired pair leaves
	/// both slots untouched.
	async fn try_pair(&self) {
		if self.session.lock().unwrap().pair().is_none() {
			return;
		}

		let height = match self.ledger.block_number().await {
			Ok(height) => height,
			Err(e) => {
				warn!("Skipping pairing, block height unavailable: {}", e);
				return;
			}
		};

		let committed = {
			let mut session = self.session.lock().unwrap();
			match session.pair() {
				Some((demand, offer)) if !demand.matches(&offer) => {
					debug!("Held demand and offer do not match");
					None
				}
				Some((demand, _)) if !demand.is_live_at(height) => {
					info!(
						"Demand deadline {} passed at height {}, not settling",
						demand.deadline, height
					);
					None
				}
				Some((demand, offer)) => {
					session.offer = None;
					Some((demand, offer))
				}
				None => None,
			}
		};
		let Some((demand, offer)) = committed else {
			return;
		};

		info!("Matched pair for model 0x{}", hex::encode(&demand.model));
		match self.settlement.create_liability(demand, offer).await {
			Ok(liability) => {
				self.publish(TopicMessage::LiabilityCreated { liability }).await;
			}
			Err(e) => error!("Settlement failed: {}", e),
		}
	}

	async fn publish(&self, message: TopicMessage) {
		self.publish_raw(message.to_bytes()).await;
	}

	async fn publish_raw(&self, payload: Vec<u8>) {
		if let Err(e) = self.transport.publish(&self.topic, payload).await {
			warn!("Failed to publish on '{}': {}", self.topic, e);
		}
	}

	#[cfg(test)]
	fn offer_pending(&self) -> bool {
		self.session.lock().unwrap().offer.is_some()
	}

	#[cfg(test)]
	fn demand_pending(&self) -> bool {
		self.session.lock().unwrap().demand.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use provider_ledger::LedgerError;
	use provider_transport::{InboundMessage, TransportError};
	use provider_types::{ContractCall, Receipt};
	use std::sync::Mutex as StdMutex;
	use tokio::sync::{mpsc, oneshot};

	const OWN: &str = "QmOwnPeer";
	const AGENT: &str = "QmAgentPeer";
	const CONSUMER: &str = "QmConsumerPeer";

	struct RecordingTransport {
		published: StdMutex<Vec<Vec<u8>>>,
	}

	impl RecordingTransport {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				published: StdMutex::new(Vec::new()),
			})
		}

		fn raw(&self) -> Vec<Vec<u8>> {
			self.published.lock().unwrap().clone()
		}

		fn published(&self) -> Vec<TopicMessage> {
			self.raw()
				.iter()
				.map(|payload| TopicMessage::classify(payload))
				.collect()
		}

		fn count(&self, filter: impl Fn(&TopicMessage) -> bool) -> usize {
			self.published().iter().filter(|m| filter(m)).count()
		}
	}

	#[async_trait]
	impl Transport for RecordingTransport {
		async fn publish(&self, _topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
			self.published.lock().unwrap().push(payload);
			Ok(())
		}

		async fn subscribe(
			&self,
			_topic: &str,
		) -> Result<mpsc::Receiver<InboundMessage>, TransportError> {
			let (_sender, receiver) = mpsc::channel(1);
			Ok(receiver)
		}
	}

	struct FixedLedger {
		height: u64,
	}

	#[async_trait]
	impl LedgerClient for FixedLedger {
		async fn block_number(&self) -> Result<u64, LedgerError> {
			Ok(self.height)
		}

		async fn pending_nonce(&self, _address: Address) -> Result<u64, LedgerError> {
			Ok(0)
		}

		async fn submit_call(&self, _call: ContractCall) -> Result<Receipt, LedgerError> {
			unreachable!("engine never submits calls directly")
		}

		fn operator(&self) -> Address {
			Address::ZERO
		}
	}

	/// Blocks the first height read until released; later reads answer
	/// immediately.
	struct GatedLedger {
		release: StdMutex<Option<oneshot::Receiver<()>>>,
		entered: StdMutex<Option<oneshot::Sender<()>>>,
	}

	#[async_trait]
	impl LedgerClient for GatedLedger {
		async fn block_number(&self) -> Result<u64, LedgerError> {
			let gate = self.release.lock().unwrap().take();
			if let Some(gate) = gate {
				if let Some(entered) = self.entered.lock().unwrap().take() {
					let _ = entered.send(());
				}
				let _ = gate.await;
			}
			Ok(500)
		}

		async fn pending_nonce(&self, _address: Address) -> Result<u64, LedgerError> {
			Ok(0)
		}

		async fn submit_call(&self, _call: ContractCall) -> Result<Receipt, LedgerError> {
			unreachable!("engine never submits calls directly")
		}

		fn operator(&self) -> Address {
			Address::ZERO
		}
	}

	#[derive(Default)]
	struct MockSettlement {
		created: StdMutex<Vec<(Intent, Intent)>>,
		results: StdMutex<Vec<ResultNotice>>,
		acks: StdMutex<u32>,
	}

	#[async_trait]
	impl Settlement for MockSettlement {
		async fn create_liability(
			&self,
			demand: Intent,
			offer: Intent,
		) -> Result<Address, SettlementError> {
			self.created.lock().unwrap().push((demand, offer));
			Ok(Address::from([0x42u8; 20]))
		}

		async fn handle_result(&self, notice: ResultNotice) -> Result<(), SettlementError> {
			self.results.lock().unwrap().push(notice);
			Ok(())
		}

		async fn acknowledge_reward(&self) {
			*self.acks.lock().unwrap() += 1;
		}
	}

	fn intent(deadline: u64, sender: u8) -> Intent {
		Intent {
			model: Bytes::from(vec![0x11]),
			objective: Bytes::from(vec![0x22]),
			token: Address::from([1u8; 20]),
			cost: U256::from(10),
			lighthouse: Address::from([2u8; 20]),
			validator: Address::from([3u8; 20]),
			fee: U256::from(1),
			deadline,
			sender: Address::from([sender; 20]),
			signature: Bytes::from(vec![0xaa; 65]),
		}
	}

	fn engine_with(
		ledger: Arc<dyn LedgerClient>,
	) -> (MatchingEngine, Arc<RecordingTransport>, Arc<MockSettlement>) {
		let transport = RecordingTransport::new();
		let settlement = Arc::new(MockSettlement::default());
		let engine = MatchingEngine::new(
			transport.clone(),
			ledger,
			settlement.clone(),
			"topic".to_string(),
			Bytes::from(vec![0x11]),
			PeerRoles::new(OWN, AGENT),
		);
		(engine, transport, settlement)
	}

	fn engine(
		height: u64,
	) -> (MatchingEngine, Arc<RecordingTransport>, Arc<MockSettlement>) {
		engine_with(Arc::new(FixedLedger { height }))
	}

	fn wire(message: &TopicMessage) -> Vec<u8> {
		message.to_bytes()
	}

	#[tokio::test]
	async fn live_pair_settles_once_and_announces_the_liability() {
		let (engine, transport, settlement) = engine(500);

		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(intent(1000, 4))))
			.await;
		engine
			.on_message(AGENT, &wire(&TopicMessage::Offer(intent(1000, 5))))
			.await;

		let created = settlement.created.lock().unwrap().clone();
		assert_eq!(created.len(), 1);
		assert_eq!(created[0].0.sender, Address::from([4u8; 20]));
		assert_eq!(created[0].1.sender, Address::from([5u8; 20]));

		assert!(!engine.offer_pending());
		assert!(engine.demand_pending());
		assert_eq!(
			transport.count(|m| matches!(
				m,
				TopicMessage::LiabilityCreated { liability } if *liability == Address::from([0x42u8; 20])
			)),
			1
		);
	}

	#[tokio::test]
	async fn expired_demand_is_never_settled_and_both_slots_are_retained() {
		let (engine, _transport, settlement) = engine(1001);

		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(intent(1000, 4))))
			.await;
		engine
			.on_message(AGENT, &wire(&TopicMessage::Offer(intent(1000, 5))))
			.await;

		assert!(settlement.created.lock().unwrap().is_empty());
		assert!(engine.offer_pending());
		assert!(engine.demand_pending());

		// A fresh demand pairs against the retained offer.
		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(intent(2000, 4))))
			.await;
		assert_eq!(settlement.created.lock().unwrap().len(), 1);
		assert!(!engine.offer_pending());
	}

	#[tokio::test]
	async fn offer_replaced_mid_pairing_is_revalidated_before_settling() {
		let (release_tx, release_rx) = oneshot::channel();
		let (entered_tx, entered_rx) = oneshot::channel();
		let ledger = Arc::new(GatedLedger {
			release: StdMutex::new(Some(release_rx)),
			entered: StdMutex::new(Some(entered_tx)),
		});
		let (engine, _transport, settlement) = engine_with(ledger);
		let engine = Arc::new(engine);

		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(intent(1000, 4))))
			.await;

		// First matching offer suspends on the height read.
		let first = tokio::spawn({
			let engine = engine.clone();
			async move {
				engine
					.on_message(AGENT, &wire(&TopicMessage::Offer(intent(1000, 5))))
					.await;
			}
		});
		entered_rx.await.unwrap();

		// A different offer lands in the slot while the read is in flight.
		let mut replacement = intent(1000, 6);
		replacement.objective = Bytes::from(vec![0x23]);
		engine
			.on_message(AGENT, &wire(&TopicMessage::Offer(replacement)))
			.await;

		release_tx.send(()).unwrap();
		first.await.unwrap();

		// The replacement never matched the demand, so nothing is settled
		// and the slot keeps it for a later demand.
		assert!(settlement.created.lock().unwrap().is_empty());
		assert!(engine.offer_pending());
	}

	#[tokio::test]
	async fn demand_echo_preserves_the_adopted_document() {
		let (engine, transport, _settlement) = engine(500);

		// Real demand traffic carries fields the intent does not model,
		// such as the factory nonce; the echo must not shed them.
		let document = serde_json::json!({
			"model": "0x11",
			"objective": "0x22",
			"token": "0x0101010101010101010101010101010101010101",
			"cost": "1",
			"lighthouse": "0x0202020202020202020202020202020202020202",
			"validator": "0x0303030303030303030303030303030303030303",
			"validatorFee": "2",
			"deadline": 1000,
			"nonce": 7,
			"sender": "0x0404040404040404040404040404040404040404",
			"signature": "0xaaaa",
		})
		.to_string();

		engine.on_message(CONSUMER, document.as_bytes()).await;

		let raw = transport.raw();
		assert_eq!(raw[0], document.as_bytes());
		assert!(matches!(
			TopicMessage::classify(&raw[1]),
			TopicMessage::DemandAck { .. }
		));
	}

	#[tokio::test]
	async fn adopted_demand_is_echoed_and_acknowledged() {
		let (engine, transport, _settlement) = engine(500);

		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(intent(1000, 4))))
			.await;

		let published = transport.published();
		assert!(matches!(published[0], TopicMessage::Demand(_)));
		assert!(matches!(
			published[1],
			TopicMessage::DemandAck { demand_sender, .. } if demand_sender == Address::from([4u8; 20])
		));
	}

	#[tokio::test]
	async fn duplicate_demand_reacks_without_readopting() {
		let (engine, transport, settlement) = engine(500);
		let demand = TopicMessage::Demand(intent(1000, 4));

		engine.on_message(CONSUMER, &wire(&demand)).await;
		engine.on_message(CONSUMER, &wire(&demand)).await;

		assert_eq!(
			transport.count(|m| matches!(m, TopicMessage::DemandAck { .. })),
			2
		);
		// Echoed once, on first adoption only.
		assert_eq!(
			transport.count(|m| matches!(m, TopicMessage::Demand(_))),
			1
		);
		assert!(settlement.created.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn foreign_model_demand_is_ignored() {
		let (engine, transport, _settlement) = engine(500);
		let mut foreign = intent(1000, 4);
		foreign.model = Bytes::from(vec![0x99]);

		engine
			.on_message(CONSUMER, &wire(&TopicMessage::Demand(foreign)))
			.await;

		assert!(!engine.demand_pending());
		assert!(transport.published().is_empty());
	}

	#[tokio::test]
	async fn own_messages_are_dropped() {
		let (engine, transport, _settlement) = engine(500);

		engine
			.on_message(OWN, &wire(&TopicMessage::Demand(intent(1000, 4))))
			.await;

		assert!(!engine.demand_pending());
		assert!(transport.published().is_empty());
	}

	#[tokio::test]
	async fn agent_result_is_forwarded_to_settlement() {
		let (engine, _transport, settlement) = engine(500);

		engine
			.on_message(
				AGENT,
				br#"{"result": "QmResultHash", "success": true}"#,
			)
			.await;

		let results = settlement.results.lock().unwrap().clone();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].result, "QmResultHash");
	}

	#[tokio::test]
	async fn queue_status_changes_nothing() {
		let (engine, transport, settlement) = engine(500);

		engine.on_message(AGENT, br#"{"queue": 3}"#).await;

		assert!(transport.published().is_empty());
		assert!(settlement.created.lock().unwrap().is_empty());
		assert!(!engine.offer_pending());
	}

	#[tokio::test]
	async fn reward_ack_cancels_the_notifier() {
		let (engine, _transport, settlement) = engine(500);

		engine.on_message(CONSUMER, br#"{"gotNFT": true}"#).await;

		assert_eq!(*settlement.acks.lock().unwrap(), 1);
	}

	#[tokio::test]
	async fn malformed_traffic_is_dropped_silently() {
		let (engine, transport, settlement) = engine(500);

		engine.on_message(CONSUMER, b"not json at all").await;
		engine.on_message(AGENT, b"{\"unknown\": 1}").await;

		assert!(transport.published().is_empty());
		assert!(settlement.created.lock().unwrap().is_empty());
		assert!(!engine.demand_pending());
		assert!(!engine.offer_pending());
	}
}
