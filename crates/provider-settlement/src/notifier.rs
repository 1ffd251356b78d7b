//! Bounded, cancellable reward notification loop.
//!
//! One notifier runs per mint cycle. It re-publishes the identical reward
//! notice on a fixed period until the demander acknowledges it or the
//! attempt budget runs out, whichever comes first. Dropping the handle
//! cancels the task, so a notifier cannot outlive its session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use provider_transport::Transport;
use provider_types::TopicMessage;

/// Retry budget for one notification loop.
#[derive(Debug, Clone, Copy)]
pub struct NotifierSettings {
	pub period: Duration,
	pub max_attempts: u32,
}

impl Default for NotifierSettings {
	fn default() -> Self {
		Self {
			period: Duration::from_secs(5),
			max_attempts: 10,
		}
	}
}

/// Handle to a running notification loop.
pub struct NotifierHandle {
	cancel: watch::Sender<bool>,
	task: JoinHandle<()>,
}

impl NotifierHandle {
	/// Stops the loop: the acknowledgement arrived.
	pub fn acknowledge(&self) {
		let _ = self.cancel.send(true);
	}

	/// Whether the loop has already terminated (ack or exhaustion).
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

impl Drop for NotifierHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Spawns the notification loop for a freshly minted reward.
///
/// The first publish happens immediately; subsequent ones follow the
/// configured period.
pub fn spawn_reward_notifier(
	transport: Arc<dyn Transport>,
	topic: String,
	message: TopicMessage,
	settings: NotifierSettings,
) -> NotifierHandle {
	let (cancel, mut cancelled) = watch::channel(false);

	let task = tokio::spawn(async move {
		let mut interval = tokio::time::interval(settings.period);
		let payload = message.to_bytes();

		for attempt in 1..=settings.max_attempts {
			tokio::select! {
				_ = interval.tick() => {
					debug!("Reward notice attempt {}/{}", attempt, settings.max_attempts);
					if let Err(e) = transport.publish(&topic, payload.clone()).await {
						warn!("Reward notice publish failed: {}", e);
					}
				}
				_ = cancelled.changed() => {
					info!("Reward notice acknowledged after {} attempts", attempt - 1);
					return;
				}
			}
		}

		warn!(
			"Reward notice unacknowledged after {} attempts, giving up",
			settings.max_attempts
		);
	});

	NotifierHandle { cancel, task }
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use provider_transport::{InboundMessage, TransportError};
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::sync::mpsc;

	struct CountingTransport {
		published: AtomicU32,
	}

	#[async_trait]
	impl Transport for CountingTransport {
		async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
			self.published.fetch_add(1, Ordering::SeqCst);
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

	fn notice() -> TopicMessage {
		TopicMessage::RewardAck
	}

	#[tokio::test(start_paused = true)]
	async fn fires_at_most_max_attempts() {
		let transport = Arc::new(CountingTransport {
			published: AtomicU32::new(0),
		});
		let handle = spawn_reward_notifier(
			transport.clone(),
			"topic".into(),
			notice(),
			NotifierSettings {
				period: Duration::from_secs(5),
				max_attempts: 10,
			},
		);

		// Well past the full budget
		for _ in 0..30 {
			tokio::time::advance(Duration::from_secs(5)).await;
			tokio::task::yield_now().await;
		}

		while !handle.is_finished() {
			tokio::task::yield_now().await;
		}
		assert_eq!(transport.published.load(Ordering::SeqCst), 10);
	}

	#[tokio::test(start_paused = true)]
	async fn acknowledgement_stops_the_loop() {
		let transport = Arc::new(CountingTransport {
			published: AtomicU32::new(0),
		});
		let handle = spawn_reward_notifier(
			transport.clone(),
			"topic".into(),
			notice(),
			NotifierSettings {
				period: Duration::from_secs(5),
				max_attempts: 10,
			},
		);

		// Let a couple of attempts through, then acknowledge.
		tokio::time::advance(Duration::from_secs(6)).await;
		tokio::task::yield_now().await;
		handle.acknowledge();

		while !handle.is_finished() {
			tokio::task::yield_now().await;
		}

		let fired = transport.published.load(Ordering::SeqCst);
		assert!(fired >= 1 && fired < 10, "fired {} times", fired);

		// No further fires after termination.
		tokio::time::advance(Duration::from_secs(60)).await;
		tokio::task::yield_now().await;
		assert_eq!(transport.published.load(Ordering::SeqCst), fired);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_the_handle_cancels_the_task() {
		let transport = Arc::new(CountingTransport {
			published: AtomicU32::new(0),
		});
		let handle = spawn_reward_notifier(
			transport.clone(),
			"topic".into(),
			notice(),
			NotifierSettings::default(),
		);
		drop(handle);

		tokio::time::advance(Duration::from_secs(60)).await;
		tokio::task::yield_now().await;
		// At most the immediate first fire could have slipped in.
		assert!(transport.published.load(Ordering::SeqCst) <= 1);
	}
}
