//! IPFS pubsub transport over the HTTP API.
//!
//! Topics and payloads cross the API multibase-encoded (`u` prefix,
//! unpadded base64url). The subscribe endpoint is a long-lived request
//! streaming one JSON document per line; the stream is re-established with
//! a short pause if the daemon drops it, for as long as the subscriber side
//! of the channel is alive.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{InboundMessage, Transport, TransportError};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const RESUBSCRIBE_PAUSE: Duration = Duration::from_secs(5);
const CHANNEL_CAPACITY: usize = 256;

/// Transport implementation backed by an IPFS daemon's HTTP API.
pub struct IpfsPubsub {
	api_url: String,
	client: reqwest::Client,
}

/// One frame of the ndjson subscribe stream.
#[derive(Debug, Deserialize)]
struct PubsubFrame {
	#[serde(default)]
	from: String,
	#[serde(default)]
	data: String,
}

impl IpfsPubsub {
	pub fn new(api_url: impl Into<String>) -> Self {
		Self {
			api_url: api_url.into(),
			client: reqwest::Client::new(),
		}
	}

	fn pub_url(&self, topic: &str) -> String {
		format!(
			"{}/api/v0/pubsub/pub?arg={}",
			self.api_url,
			multibase_encode(topic.as_bytes())
		)
	}

	fn sub_url(&self, topic: &str) -> String {
		format!(
			"{}/api/v0/pubsub/sub?arg={}",
			self.api_url,
			multibase_encode(topic.as_bytes())
		)
	}

	async fn run_subscription(
		client: reqwest::Client,
		url: String,
		sender: mpsc::Sender<InboundMessage>,
	) {
		loop {
			match Self::stream_once(&client, &url, &sender).await {
				Ok(()) => {
					if sender.is_closed() {
						debug!("Subscriber dropped, ending pubsub stream");
						return;
					}
					warn!("Pubsub stream ended, resubscribing");
				}
				Err(e) => {
					if sender.is_closed() {
						return;
					}
					warn!("Pubsub stream error: {}, resubscribing", e);
				}
			}
			tokio::time::sleep(RESUBSCRIBE_PAUSE).await;
		}
	}

	/// Runs one subscribe request to completion, forwarding decoded frames.
	async fn stream_once(
		client: &reqwest::Client,
		url: &str,
		sender: &mpsc::Sender<InboundMessage>,
	) -> Result<(), TransportError> {
		let response = client
			.post(url)
			.send()
			.await
			.map_err(|e| TransportError::Connection(e.to_string()))?
			.error_for_status()
			.map_err(|e| TransportError::Connection(e.to_string()))?;

		let mut stream = response.bytes_stream();
		let mut buffer: Vec<u8> = Vec::new();

		while let Some(chunk) = stream.next().await {
			let chunk = chunk.map_err(|e| TransportError::Connection(e.to_string()))?;
			buffer.extend_from_slice(&chunk);

			while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
				let line: Vec<u8> = buffer.drain(..=newline).collect();
				let Some(message) = parse_frame(&line) else {
					continue;
				};
				if sender.send(message).await.is_err() {
					return Ok(());
				}
			}
		}

		Ok(())
	}
}

#[async_trait]
impl Transport for IpfsPubsub {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
		let part = reqwest::multipart::Part::bytes(payload).file_name("data");
		let form = reqwest::multipart::Form::new().part("file", part);

		self.client
			.post(self.pub_url(topic))
			.timeout(PUBLISH_TIMEOUT)
			.multipart(form)
			.send()
			.await
			.map_err(|e| TransportError::Connection(e.to_string()))?
			.error_for_status()
			.map_err(|e| TransportError::Connection(e.to_string()))?;

		Ok(())
	}

	async fn subscribe(
		&self,
		topic: &str,
	) -> Result<mpsc::Receiver<InboundMessage>, TransportError> {
		let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
		let client = self.client.clone();
		let url = self.sub_url(topic);

		info!("Subscribing to pubsub topic {}", topic);
		tokio::spawn(Self::run_subscription(client, url, sender));

		Ok(receiver)
	}
}

/// Multibase `u` (unpadded base64url) encoding used by the pubsub API.
fn multibase_encode(data: &[u8]) -> String {
	format!("u{}", general_purpose::URL_SAFE_NO_PAD.encode(data))
}

fn multibase_decode(data: &str) -> Option<Vec<u8>> {
	let encoded = data.strip_prefix('u')?;
	general_purpose::URL_SAFE_NO_PAD.decode(encoded).ok()
}

fn parse_frame(line: &[u8]) -> Option<InboundMessage> {
	let line = std::str::from_utf8(line).ok()?.trim();
	if line.is_empty() {
		return None;
	}
	let frame: PubsubFrame = serde_json::from_str(line).ok()?;
	let data = multibase_decode(&frame.data)?;
	Some(InboundMessage {
		from: frame.from,
		data,
	})
}
