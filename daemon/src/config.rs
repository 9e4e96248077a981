use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding the classifier credential.
pub const TOKEN_ENV: &str = "VERDICT_CLASSIFIER_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read config {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid config value `{field}`: {reason}")]
	Invalid { field: &'static str, reason: String },

	#[error("no classifier token configured (set {TOKEN_ENV} or classifier.token)")]
	MissingToken,

	#[error("no data directory available for the database; set storage.path")]
	NoDataDir,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
	pub server: ServerConfig,
	pub classifier: ClassifierConfig,
	pub storage: StorageConfig,
	pub auth: AuthConfig,
	pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
	pub host: String,
	pub port: u16,
	/// 0 lets actix pick one worker per core.
	pub workers: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self { host: "127.0.0.1".into(), port: 8080, workers: 0 }
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
	pub upload_endpoint: String,
	pub url_endpoint: String,
	pub token: Option<String>,
	pub timeout_secs: u64,
	pub connect_timeout_secs: u64,
	pub max_in_flight: usize,
}

impl Default for ClassifierConfig {
	fn default() -> Self {
		Self {
			upload_endpoint: "http://api.deep3d.ai/v1/predict".into(),
			url_endpoint: "http://api.deep3d.ai/v1/predict-url".into(),
			token: None,
			timeout_secs: 30,
			connect_timeout_secs: 10,
			max_in_flight: 8,
		}
	}
}

impl ClassifierConfig {
	/// Authorization header value, `Bearer ` prefixed.
	pub fn bearer(&self) -> Option<String> {
		let token = self.token.as_deref()?.trim();
		if token.is_empty() {
			return None;
		}
		match token.get(..7) {
			Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => Some(format!("Bearer {}", token[7..].trim())),
			_ => Some(format!("Bearer {token}")),
		}
	}
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
	#[default]
	SurrealKv,
	Memory,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
	pub engine: StorageEngine,
	pub path: Option<PathBuf>,
}

impl StorageConfig {
	/// Configured path, or `<data dir>/Verdict/verdict.db`.
	pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
		match &self.path {
			Some(p) => Ok(p.clone()),
			None => dirs::data_dir()
				.map(|d| d.join("Verdict").join("verdict.db"))
				.ok_or(ConfigError::NoDataDir),
		}
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
	pub session_ttl_hours: u64,
}

impl Default for AuthConfig {
	fn default() -> Self {
		Self { session_ttl_hours: 24 * 30 }
	}
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
	pub filter: String,
	pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self { filter: "info".into(), dir: None }
	}
}

impl Config {
	/// Load from an optional TOML file, then apply environment overrides and validate.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		config.apply_overrides(|key| std::env::var(key).ok());
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		toml::from_str(&text).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
			self.classifier.token = Some(token);
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let c = &self.classifier;
		check_endpoint("classifier.upload_endpoint", &c.upload_endpoint)?;
		check_endpoint("classifier.url_endpoint", &c.url_endpoint)?;
		if c.timeout_secs == 0 {
			return Err(ConfigError::Invalid { field: "classifier.timeout_secs", reason: "must be > 0".into() });
		}
		if c.connect_timeout_secs == 0 {
			return Err(ConfigError::Invalid {
				field: "classifier.connect_timeout_secs",
				reason: "must be > 0".into(),
			});
		}
		if c.max_in_flight == 0 {
			return Err(ConfigError::Invalid { field: "classifier.max_in_flight", reason: "must be > 0".into() });
		}
		if self.auth.session_ttl_hours == 0 {
			return Err(ConfigError::Invalid { field: "auth.session_ttl_hours", reason: "must be > 0".into() });
		}
		Ok(())
	}
}

fn check_endpoint(field: &'static str, raw: &str) -> Result<(), ConfigError> {
	let url = Url::parse(raw).map_err(|e| ConfigError::Invalid { field, reason: e.to_string() })?;
	if !matches!(url.scheme(), "http" | "https") {
		return Err(ConfigError::Invalid { field, reason: format!("unsupported scheme {}", url.scheme()) });
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = Config::default();
		assert!(config.validate().is_ok());
		assert_eq!(config.server.port, 8080);
		assert_eq!(config.classifier.timeout_secs, 30);
		assert_eq!(config.storage.engine, StorageEngine::SurrealKv);
	}

	#[test]
	fn partial_file_keeps_defaults() {
		let tmp = tempfile::tempdir().unwrap();
		let path = tmp.path().join("verdict.toml");
		std::fs::write(
			&path,
			r#"
[server]
port = 9090

[classifier]
token = "abc"
timeout_secs = 5

[storage]
engine = "memory"
"#,
		)
		.unwrap();

		let config = Config::from_file(&path).unwrap();
		assert_eq!(config.server.port, 9090);
		assert_eq!(config.server.host, "127.0.0.1");
		assert_eq!(config.classifier.timeout_secs, 5);
		assert_eq!(config.classifier.connect_timeout_secs, 10);
		assert_eq!(config.storage.engine, StorageEngine::Memory);
		assert_eq!(config.classifier.bearer().as_deref(), Some("Bearer abc"));
	}

	#[test]
	fn bad_toml_reports_path() {
		let tmp = tempfile::tempdir().unwrap();
		let path = tmp.path().join("broken.toml");
		std::fs::write(&path, "[server\nport = ").unwrap();
		let err = Config::from_file(&path).unwrap_err();
		assert!(matches!(err, ConfigError::Parse { .. }));
	}

	#[test]
	fn env_token_overrides_file() {
		let mut config = Config::default();
		config.classifier.token = Some("from-file".into());
		config.apply_overrides(|k| (k == TOKEN_ENV).then(|| "Bearer from-env".to_string()));
		assert_eq!(config.classifier.bearer().as_deref(), Some("Bearer from-env"));
	}

	#[test]
	fn bearer_prefix_not_doubled() {
		let mut c = ClassifierConfig::default();
		c.token = Some("bearer xyz".into());
		assert_eq!(c.bearer().as_deref(), Some("Bearer xyz"));
		c.token = Some("   ".into());
		assert_eq!(c.bearer(), None);
	}

	#[test]
	fn zero_timeout_rejected() {
		let mut config = Config::default();
		config.classifier.timeout_secs = 0;
		assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "classifier.timeout_secs", .. })));
	}

	#[test]
	fn relative_endpoint_rejected() {
		let mut config = Config::default();
		config.classifier.url_endpoint = "/v1/predict-url".into();
		assert!(config.validate().is_err());
	}
}
