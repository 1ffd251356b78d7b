//! Sender classification and pairing state.

use provider_types::Intent;

/// Who a pubsub message came from, resolved once from configured peer
/// identities instead of string comparison at every dispatch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
	/// This process. Its own broadcasts echo back on the shared topic.
	Own,
	/// The computation agent paired with this provider.
	Agent,
	/// Anyone else on the topic, treated as demand-side.
	Other,
}

/// The two peer identities the engine distinguishes.
#[derive(Debug, Clone)]
pub struct PeerRoles {
	own: String,
	agent: String,
}

impl PeerRoles {
	pub fn new(own: impl Into<String>, agent: impl Into<String>) -> Self {
		Self {
			own: own.into(),
			agent: agent.into(),
		}
	}

	pub fn classify(&self, sender: &str) -> SenderRole {
		if sender == self.own {
			SenderRole::Own
		} else if sender == self.agent {
			SenderRole::Agent
		} else {
			SenderRole::Other
		}
	}
}

/// The engine's pairing slots.
///
/// At most one demand and one offer are held at a time; a newer demand
/// overwrites the old one, and the offer slot is emptied the moment a
/// pair enters settlement.
#[derive(Debug, Default)]
pub struct MatchSession {
	pub demand: Option<Intent>,
	pub offer: Option<Intent>,
}

impl MatchSession {
	/// Stores a demand. Returns false when the identical demand is
	/// already held, which maps to the idempotent re-ack path.
	pub fn adopt_demand(&mut self, demand: Intent) -> bool {
		if self.demand.as_ref() == Some(&demand) {
			return false;
		}
		self.demand = Some(demand);
		true
	}

	/// Clones out the pair when both slots are occupied.
	pub fn pair(&self) -> Option<(Intent, Intent)> {
		match (&self.demand, &self.offer) {
			(Some(demand), Some(offer)) => Some((demand.clone(), offer.clone())),
			_ => None,
		}
	}
}
