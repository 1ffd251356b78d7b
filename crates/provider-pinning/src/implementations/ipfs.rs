//! Directory listing via the IPFS HTTP API `ls` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{PinningError, StorageClient};

pub struct IpfsStorage {
	api_url: String,
	client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
	#[serde(rename = "Objects", default)]
	objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
	#[serde(rename = "Hash")]
	hash: String,
	#[serde(rename = "Links", default)]
	links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
	#[serde(rename = "Name")]
	name: String,
}

impl IpfsStorage {
	pub fn new(api_url: impl Into<String>) -> Self {
		Self {
			api_url: api_url.into(),
			client: reqwest::Client::new(),
		}
	}
}

#[async_trait]
impl StorageClient for IpfsStorage {
	async fn list_entries(&self, content_hash: &str) -> Result<Vec<String>, PinningError> {
		let url = format!("{}/api/v0/ls?arg={}", self.api_url, content_hash);

		let response: LsResponse = self
			.client
			.post(&url)
			.send()
			.await
			.map_err(|e| PinningError::Connection(e.to_string()))?
			.error_for_status()
			.map_err(|e| PinningError::Connection(e.to_string()))?
			.json()
			.await
			.map_err(|e| PinningError::Decode(e.to_string()))?;

		let entries: Vec<String> = response
			.objects
			.iter()
			.flat_map(|object| {
				object
					.links
					.iter()
					.map(move |link| format!("{}/{}", object.hash, link.name))
			})
			.collect();

		debug!("Listed {} entries under {}", entries.len(), content_hash);

		if entries.is_empty() {
			return Err(PinningError::EmptyListing(content_hash.to_string()));
		}

		Ok(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_ls_response() {
		let raw = r#"{
			"Objects": [
				{
					"Hash": "QmResult",
					"Links": [
						{ "Name": "shot-1", "Hash": "QmA", "Size": 10, "Type": 2 },
						{ "Name": "shot-2", "Hash": "QmB", "Size": 11, "Type": 2 }
					]
				}
			]
		}"#;
		let response: LsResponse = serde_json::from_str(raw).unwrap();
		assert_eq!(response.objects[0].hash, "QmResult");
		assert_eq!(response.objects[0].links[1].name, "shot-2");
	}
}
