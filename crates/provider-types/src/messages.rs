//! Wire schemas for the shared pub/sub topic.
//!
//! Messages on the topic are JSON documents discriminated by field presence,
//! not by an explicit type tag. Inbound traffic is classified into the
//! [`TopicMessage`] union; anything that fits no schema (including malformed
//! JSON, which is expected on a shared broadcast channel) becomes
//! [`TopicMessage::Unrecognized`] rather than an error.

use alloy_primitives::{Address, Bytes, U256};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::intents::{Intent, IntentKind};

/// Signature as intent publishers send it: either the nested
/// `{"signature": "0x…"}` envelope or a plain hex string.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureEnvelope {
	pub signature: Bytes,
}

impl<'de> Deserialize<'de> for SignatureEnvelope {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Wire {
			Enveloped { signature: Bytes },
			Flat(Bytes),
		}

		let signature = match Wire::deserialize(deserializer)? {
			Wire::Enveloped { signature } => signature,
			Wire::Flat(signature) => signature,
		};
		Ok(SignatureEnvelope { signature })
	}
}

/// Quantities arrive either as JSON numbers or as decimal/hex strings,
/// depending on the publisher's web3 tooling.
fn quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	match Value::deserialize(deserializer)? {
		Value::Number(n) => n
			.as_u64()
			.ok_or_else(|| de::Error::custom(format!("quantity out of range: {}", n))),
		Value::String(s) => {
			let parsed = match s.strip_prefix("0x") {
				Some(hex) => u64::from_str_radix(hex, 16),
				None => s.parse(),
			};
			parsed.map_err(|e| de::Error::custom(format!("bad quantity {:?}: {}", s, e)))
		}
		other => Err(de::Error::custom(format!(
			"expected number or string, got {}",
			other
		))),
	}
}

/// Demand as it appears on the wire. Carries the validator fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandWire {
	pub model: Bytes,
	pub objective: Bytes,
	pub token: Address,
	#[serde(deserialize_with = "quantity")]
	pub cost: u64,
	pub lighthouse: Address,
	pub validator: Address,
	#[serde(rename = "validatorFee", deserialize_with = "quantity")]
	pub validator_fee: u64,
	pub deadline: u64,
	pub sender: Address,
	pub signature: SignatureEnvelope,
}

/// Offer as it appears on the wire. Carries the lighthouse fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferWire {
	pub model: Bytes,
	pub objective: Bytes,
	pub token: Address,
	#[serde(deserialize_with = "quantity")]
	pub cost: u64,
	pub validator: Address,
	pub lighthouse: Address,
	#[serde(rename = "lighthouseFee", deserialize_with = "quantity")]
	pub lighthouse_fee: u64,
	pub deadline: u64,
	pub sender: Address,
	pub signature: SignatureEnvelope,
}

impl From<DemandWire> for Intent {
	fn from(w: DemandWire) -> Self {
		Intent {
			model: w.model,
			objective: w.objective,
			token: w.token,
			cost: U256::from(w.cost),
			lighthouse: w.lighthouse,
			validator: w.validator,
			fee: U256::from(w.validator_fee),
			deadline: w.deadline,
			sender: w.sender,
			signature: w.signature.signature,
		}
	}
}

impl From<OfferWire> for Intent {
	fn from(w: OfferWire) -> Self {
		Intent {
			model: w.model,
			objective: w.objective,
			token: w.token,
			cost: U256::from(w.cost),
			lighthouse: w.lighthouse,
			validator: w.validator,
			fee: U256::from(w.lighthouse_fee),
			deadline: w.deadline,
			sender: w.sender,
			signature: w.signature.signature,
		}
	}
}

/// Result notice published by the computation agent once a task finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNotice {
	/// Content hash of the produced artifact directory.
	pub result: String,
	/// Whether the computation succeeded. Older agents omit it; absence
	/// means success.
	#[serde(default = "default_true")]
	pub success: bool,
}

fn default_true() -> bool {
	true
}

/// One inbound or outbound message on the shared topic.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicMessage {
	/// A consumer's demand intent.
	Demand(Intent),
	/// The agent's offer intent.
	Offer(Intent),
	/// Acknowledgement that a demand was adopted (`gotDemand`).
	DemandAck {
		demand_sender: Address,
		demand_objective: Bytes,
	},
	/// Computation result from the agent.
	Result(ResultNotice),
	/// Announcement of a freshly created liability.
	LiabilityCreated { liability: Address },
	/// Announcement that a liability was finalized.
	Finalized { liability: Address },
	/// Repeated reward announcement, re-sent until acknowledged.
	RewardNotice {
		liability: Address,
		reward_contract: Address,
		token_id: u64,
	},
	/// Consumer's acknowledgement of the reward notice (`gotNFT`).
	RewardAck,
	/// Agent queue/status chatter; logged, never acted on.
	QueueStatus(Value),
	/// Anything that fits no known schema.
	Unrecognized,
}

impl TopicMessage {
	/// Classifies a raw payload. Never fails; unknown or malformed input
	/// yields [`TopicMessage::Unrecognized`].
	pub fn classify(data: &[u8]) -> TopicMessage {
		match serde_json::from_slice::<Value>(data) {
			Ok(value) => Self::from_value(value),
			Err(_) => TopicMessage::Unrecognized,
		}
	}

	fn from_value(value: Value) -> TopicMessage {
		let Some(obj) = value.as_object() else {
			return TopicMessage::Unrecognized;
		};

		if obj.get("gotDemand").and_then(Value::as_bool) == Some(true) {
			let parsed = (
				obj.get("demandSender")
					.cloned()
					.map(serde_json::from_value::<Address>),
				obj.get("demandObjective")
					.cloned()
					.map(serde_json::from_value::<Bytes>),
			);
			return match parsed {
				(Some(Ok(demand_sender)), Some(Ok(demand_objective))) => TopicMessage::DemandAck {
					demand_sender,
					demand_objective,
				},
				_ => TopicMessage::Unrecognized,
			};
		}

		if obj.contains_key("result") {
			return match serde_json::from_value::<ResultNotice>(value) {
				Ok(notice) => TopicMessage::Result(notice),
				Err(_) => TopicMessage::Unrecognized,
			};
		}

		if let Some(liability) = obj.get("liability") {
			return match serde_json::from_value::<Address>(liability.clone()) {
				Ok(liability) => TopicMessage::LiabilityCreated { liability },
				Err(_) => TopicMessage::Unrecognized,
			};
		}

		if obj.get("finalized").and_then(Value::as_bool) == Some(true) {
			return match obj
				.get("finalizedLiabilityAddress")
				.map(|v| serde_json::from_value::<Address>(v.clone()))
			{
				Some(Ok(liability)) => TopicMessage::Finalized { liability },
				_ => TopicMessage::Unrecognized,
			};
		}

		if obj.contains_key("liabilityAddress")
			&& obj.contains_key("rewardContract")
			&& obj.contains_key("tokenId")
		{
			let liability = obj
				.get("liabilityAddress")
				.map(|v| serde_json::from_value::<Address>(v.clone()));
			let reward_contract = obj
				.get("rewardContract")
				.map(|v| serde_json::from_value::<Address>(v.clone()));
			let token_id = obj.get("tokenId").and_then(Value::as_u64);
			return match (liability, reward_contract, token_id) {
				(Some(Ok(liability)), Some(Ok(reward_contract)), Some(token_id)) => {
					TopicMessage::RewardNotice {
						liability,
						reward_contract,
						token_id,
					}
				}
				_ => TopicMessage::Unrecognized,
			};
		}

		if obj.get("gotNFT").and_then(Value::as_bool) == Some(true) {
			return TopicMessage::RewardAck;
		}

		if obj.contains_key("queue") {
			return TopicMessage::QueueStatus(value);
		}

		if obj.contains_key("model") && obj.contains_key("sender") {
			// The two intent shapes differ only in the fee field name.
			if obj.contains_key("lighthouseFee") {
				return match serde_json::from_value::<OfferWire>(value) {
					Ok(wire) => TopicMessage::Offer(wire.into()),
					Err(_) => TopicMessage::Unrecognized,
				};
			}
			return match serde_json::from_value::<DemandWire>(value) {
				Ok(wire) => TopicMessage::Demand(wire.into()),
				Err(_) => TopicMessage::Unrecognized,
			};
		}

		TopicMessage::Unrecognized
	}

	/// Kind of intent this message carries, if any.
	pub fn intent_kind(&self) -> Option<IntentKind> {
		match self {
			TopicMessage::Demand(_) => Some(IntentKind::Demand),
			TopicMessage::Offer(_) => Some(IntentKind::Offer),
			_ => None,
		}
	}

	/// Serializes an outbound message with the exact on-topic field names.
	///
	/// Addresses in provider-originated announcements are rendered in
	/// checksum form, matching what counterparties display and compare.
	pub fn to_wire(&self) -> Value {
		match self {
			TopicMessage::Demand(intent) => {
				serde_json::to_value(demand_wire(intent)).unwrap_or(Value::Null)
			}
			TopicMessage::Offer(intent) => {
				serde_json::to_value(offer_wire(intent)).unwrap_or(Value::Null)
			}
			TopicMessage::DemandAck {
				demand_sender,
				demand_objective,
			} => json!({
				"gotDemand": true,
				"demandSender": demand_sender,
				"demandObjective": demand_objective,
			}),
			TopicMessage::Result(notice) => json!({
				"result": notice.result,
				"success": notice.success,
			}),
			TopicMessage::LiabilityCreated { liability } => json!({
				"liability": liability.to_checksum(None),
			}),
			TopicMessage::Finalized { liability } => json!({
				"finalized": true,
				"finalizedLiabilityAddress": liability.to_checksum(None),
			}),
			TopicMessage::RewardNotice {
				liability,
				reward_contract,
				token_id,
			} => json!({
				"liabilityAddress": liability.to_checksum(None),
				"rewardContract": reward_contract.to_checksum(None),
				"tokenId": token_id,
			}),
			TopicMessage::RewardAck => json!({ "gotNFT": true }),
			TopicMessage::QueueStatus(value) => value.clone(),
			TopicMessage::Unrecognized => Value::Null,
		}
	}

	/// `to_wire`, rendered to bytes for publishing.
	pub fn to_bytes(&self) -> Vec<u8> {
		self.to_wire().to_string().into_bytes()
	}
}

/// Projects an intent back into demand wire form (validator fee).
pub fn demand_wire(intent: &Intent) -> DemandWire {
	DemandWire {
		model: intent.model.clone(),
		objective: intent.objective.clone(),
		token: intent.token,
		cost: intent.cost.saturating_to(),
		lighthouse: intent.lighthouse,
		validator: intent.validator,
		validator_fee: intent.fee.saturating_to(),
		deadline: intent.deadline,
		sender: intent.sender,
		signature: SignatureEnvelope {
			signature: intent.signature.clone(),
		},
	}
}

/// Projects an intent back into offer wire form (lighthouse fee).
pub fn offer_wire(intent: &Intent) -> OfferWire {
	OfferWire {
		model: intent.model.clone(),
		objective: intent.objective.clone(),
		token: intent.token,
		cost: intent.cost.saturating_to(),
		validator: intent.validator,
		lighthouse: intent.lighthouse,
		lighthouse_fee: intent.fee.saturating_to(),
		deadline: intent.deadline,
		sender: intent.sender,
		signature: SignatureEnvelope {
			signature: intent.signature.clone(),
		},
	}
}
