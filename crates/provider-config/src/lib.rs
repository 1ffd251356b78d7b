//! Configuration loading for the provider service.
//!
//! Configuration is a TOML file with `${VAR_NAME}` environment-variable
//! substitution, so keys and API secrets never have to live in the file
//! itself.

use std::env;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

mod types;

pub use types::{
	LedgerConfig, NotifierConfig, PinningConfig, ProviderConfig, ProviderSection, TransportConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self { file_path: None }
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub async fn load(&self) -> Result<ProviderConfig, ConfigError> {
		let config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<ProviderConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await?;

		let substituted_content = self.substitute_env_vars(&content)?;

		let config: ProviderConfig = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn validate_config(&self, config: &ProviderConfig) -> Result<(), ConfigError> {
		if config.transport.topic.is_empty() {
			return Err(ConfigError::ValidationError(
				"transport.topic must not be empty".to_string(),
			));
		}

		if config.transport.own_peer_id == config.transport.agent_peer_id {
			return Err(ConfigError::ValidationError(
				"transport.own_peer_id and transport.agent_peer_id must differ".to_string(),
			));
		}

		if config.provider.model.is_empty() {
			return Err(ConfigError::ValidationError(
				"provider.model must not be empty".to_string(),
			));
		}

		for (name, key) in [
			("ledger.provider_key", &config.ledger.provider_key),
			("ledger.oracle_key", &config.ledger.oracle_key),
		] {
			let stripped = key.strip_prefix("0x").unwrap_or(key);
			if stripped.len() != 64 || hex::decode(stripped).is_err() {
				return Err(ConfigError::ValidationError(format!(
					"{} must be 32 hex-encoded bytes",
					name
				)));
			}
		}

		if config.notifier.max_attempts == 0 {
			return Err(ConfigError::ValidationError(
				"notifier.max_attempts must be at least 1".to_string(),
			));
		}

		Ok(())
	}
}

impl ProviderConfig {
	/// Per-request ledger timeout as a [`Duration`].
	pub fn ledger_timeout(&self) -> Duration {
		Duration::from_secs(self.ledger.request_timeout_secs)
	}

	/// Reward notifier re-send period as a [`Duration`].
	pub fn notifier_period(&self) -> Duration {
		Duration::from_secs(self.notifier.period_secs)
	}
}
