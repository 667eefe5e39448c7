//! Client configuration: API base URL, refresh endpoint, entry point, and timeouts.

// std
use std::env;
// self
use crate::{_prelude::*, error::ConfigError};

/// Environment variable consulted by [`ClientConfig::from_env`].
pub const API_URL_ENV: &str = "BEARER_SESSION_API_URL";
/// Base URL used when no override is configured (local development API).
pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api/";

const DEFAULT_REFRESH_PATH: &str = "auth/refresh";
const DEFAULT_LOGIN_ENTRY_POINT: &str = "/login";
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a [`SessionClient`](crate::client::SessionClient).
///
/// Deserializable from any serde format; timeouts are expressed in whole seconds and `null`
/// disables them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// API base URL; every request path and the refresh endpoint are resolved against it.
	pub base_url: Url,
	/// Refresh endpoint path relative to [`ClientConfig::base_url`].
	#[serde(default = "default_refresh_path")]
	pub refresh_path: String,
	/// Unauthenticated entry point the session terminator redirects to.
	#[serde(default = "default_login_entry_point")]
	pub login_entry_point: String,
	/// Upper bound on a single refresh call; expiry fails the refresh cycle.
	#[serde(default = "default_refresh_timeout", with = "optional_secs")]
	pub refresh_timeout: Option<Duration>,
	/// Per-request timeout applied by the underlying HTTP client.
	#[serde(default, with = "optional_secs")]
	pub request_timeout: Option<Duration>,
}
impl ClientConfig {
	/// Creates a configuration with defaults for everything but the base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: default_refresh_path(),
			login_entry_point: default_login_entry_point(),
			refresh_timeout: default_refresh_timeout(),
			request_timeout: None,
		}
	}

	/// Builds a configuration from [`API_URL_ENV`], falling back to [`DEFAULT_BASE_URL`].
	pub fn from_env() -> Result<Self, ConfigError> {
		let raw = env::var(API_URL_ENV)
			.ok()
			.filter(|value| !value.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_BASE_URL.into());

		Self::parse(raw.trim())
	}

	/// Parses `base_url` and applies defaults.
	pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(base_url)
			.map_err(|source| ConfigError::InvalidUrl { url: base_url.into(), source })?;

		Ok(Self::new(url))
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the unauthenticated entry point.
	pub fn login_entry_point(mut self, entry_point: impl Into<String>) -> Self {
		self.login_entry_point = entry_point.into();

		self
	}

	/// Overrides (or disables with `None`) the refresh timeout.
	pub fn refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Overrides (or disables with `None`) the per-request timeout.
	pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Checks the scheme and timeouts, then normalizes the base URL so relative joins keep its
	/// last segment.
	///
	/// A zero timeout is rejected; use `None` to disable a bound.
	pub fn validate(mut self) -> Result<Self, ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.refresh_timeout.is_some_and(|timeout| timeout.is_zero()) {
			return Err(ConfigError::ZeroTimeout { field: "refresh_timeout" });
		}
		if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
			return Err(ConfigError::ZeroTimeout { field: "request_timeout" });
		}
		if !self.base_url.path().ends_with('/') {
			let path = format!("{}/", self.base_url.path());

			self.base_url.set_path(&path);
		}

		Ok(self)
	}

	/// Resolves `path` against the base URL; a leading `/` does not escape the base path.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let relative = path.trim_start_matches('/');

		self.base_url
			.join(relative)
			.map_err(|source| ConfigError::InvalidUrl { url: path.into(), source })
	}

	/// Resolves the refresh endpoint.
	pub fn refresh_endpoint(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.refresh_path)
	}
}

fn default_refresh_path() -> String {
	DEFAULT_REFRESH_PATH.into()
}

fn default_login_entry_point() -> String {
	DEFAULT_LOGIN_ENTRY_POINT.into()
}

fn default_refresh_timeout() -> Option<Duration> {
	Some(DEFAULT_REFRESH_TIMEOUT)
}

mod optional_secs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.map(|duration| duration.as_secs()).serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(<Option<u64>>::deserialize(deserializer)?.map(Duration::from_secs))
	}
}
