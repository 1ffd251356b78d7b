//! Pinata pinning service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::{PinningClient, PinningError};

const PINATA_PIN_JSON_URL: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PinataClient {
	api_key: String,
	secret_api_key: String,
	client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
	#[serde(rename = "IpfsHash")]
	ipfs_hash: String,
}

impl PinataClient {
	pub fn new(api_key: impl Into<String>, secret_api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			secret_api_key: secret_api_key.into(),
			client: reqwest::Client::new(),
		}
	}
}

#[async_trait]
impl PinningClient for PinataClient {
	async fn pin_json(&self, document: &serde_json::Value) -> Result<String, PinningError> {
		let response: PinResponse = self
			.client
			.post(PINATA_PIN_JSON_URL)
			.timeout(REQUEST_TIMEOUT)
			.header("pinata_api_key", &self.api_key)
			.header("pinata_secret_api_key", &self.secret_api_key)
			.json(document)
			.send()
			.await
			.map_err(|e| PinningError::Connection(e.to_string()))?
			.error_for_status()
			.map_err(|e| PinningError::Connection(e.to_string()))?
			.json()
			.await
			.map_err(|e| PinningError::Decode(e.to_string()))?;

		info!("Pinned document as {}", response.ipfs_hash);
		Ok(response.ipfs_hash)
	}
}
