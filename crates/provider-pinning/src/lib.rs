//! Content-addressed storage and pinning boundary.
//!
//! The settlement manager lists a result directory, derives a metadata
//! document from its first entry, and pins that document to obtain the
//! reward token URI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod ipfs;
	pub mod pinata;
}

pub use implementations::ipfs::IpfsStorage;
pub use implementations::pinata::PinataClient;

/// Errors raised by storage listing or pinning.
#[derive(Debug, Error)]
pub enum PinningError {
	#[error("Connection error: {0}")]
	Connection(String),

	#[error("Decode error: {0}")]
	Decode(String),

	#[error("Content hash {0} has no entries")]
	EmptyListing(String),
}

/// Read access to content-addressed storage.
#[async_trait]
pub trait StorageClient: Send + Sync {
	/// Lists directory entries under a content hash, as `<hash>/<name>`
	/// paths in listing order.
	async fn list_entries(&self, content_hash: &str) -> Result<Vec<String>, PinningError>;
}

/// Pinning service for small JSON documents.
#[async_trait]
pub trait PinningClient: Send + Sync {
	/// Pins a JSON document and returns its content hash.
	async fn pin_json(&self, document: &serde_json::Value) -> Result<String, PinningError>;
}

/// Metadata document pinned per reward token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardMetadata {
	pub description: String,
	pub image: String,
	pub name: String,
}

impl RewardMetadata {
	/// Derives metadata from the first listed path of a result directory.
	///
	/// The description points at the listed path on the public gateway; the
	/// image at a well-known file beneath it.
	pub fn from_listing(gateway: &str, path: &str, image_file: &str, name: &str) -> Self {
		let description = format!("{}{}", gateway, path);
		let image = format!("{}{}/{}", gateway, path, image_file);
		Self {
			description,
			image,
			name: name.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_from_first_listing() {
		let metadata = RewardMetadata::from_listing(
			"https://gateway.pinata.cloud/ipfs/",
			"QmResult/shot-1",
			"AUSTIN.jpg",
			"SpotNFT",
		);
		assert_eq!(
			metadata.description,
			"https://gateway.pinata.cloud/ipfs/QmResult/shot-1"
		);
		assert_eq!(
			metadata.image,
			"https://gateway.pinata.cloud/ipfs/QmResult/shot-1/AUSTIN.jpg"
		);
		assert_eq!(metadata.name, "SpotNFT");
	}
}
