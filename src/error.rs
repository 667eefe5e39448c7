//! Client-level error types shared across the session, store, and transport layers.

// self
use crate::{_prelude::*, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced to callers of the session client.
///
/// Business errors (any non-401 status) are not represented here: those responses are returned
/// to the caller unchanged as `Ok(response)`.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No response was received; propagated without refresh involvement.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The session could not be recovered and has been terminated.
	#[error("Session authorization is invalid: {0}")]
	AuthorizationInvalid(#[from] RefreshError),
	/// The server rejected a request again after it was replayed with a fresh token.
	#[error("Request to {} was rejected again after the token refresh.", .response.url())]
	RepeatedUnauthorized {
		/// The server's second unauthorized response, untouched.
		response: Box<Response>,
	},
	/// The server rejected a request whose body cannot be cloned for replay.
	#[error("Request to {} was unauthorized and its body cannot be replayed.", .response.url())]
	Unreplayable {
		/// The server's unauthorized response, untouched.
		response: Box<Response>,
	},
	/// A credential-issuing endpoint (login/register) rejected the call.
	#[error("Credential endpoint responded with status {status}: {}.", .message.as_deref().unwrap_or("no message"))]
	Rejected {
		/// HTTP status code returned by the endpoint.
		status: u16,
		/// Server-supplied message, when the body carried one.
		message: Option<String>,
	},
	/// A credential-issuing endpoint answered 2xx with a body that carries no credential pair.
	#[error("Credential endpoint {endpoint} returned a malformed body: {message}.")]
	MalformedResponse {
		/// Endpoint path that was called.
		endpoint: String,
		/// Path-aware parsing failure summary.
		message: String,
	},
}
impl Error {
	/// Returns the HTTP status attached to this error, if any.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::RepeatedUnauthorized { response } | Self::Unreplayable { response } =>
				Some(response.status()),
			Self::Rejected { status, .. } => StatusCode::from_u16(*status).ok(),
			Self::AuthorizationInvalid(RefreshError::Rejected { status, .. }) =>
				StatusCode::from_u16(*status).ok(),
			_ => None,
		}
	}

	/// Returns `true` when the session was terminated as part of producing this error.
	pub fn is_session_terminated(&self) -> bool {
		matches!(self, Self::AuthorizationInvalid(err) if err.terminates_session())
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL or a path relative to it cannot be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL or path.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than http/https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// A timeout was configured as zero; `None` disables a bound instead.
	#[error("Timeout `{field}` must be greater than zero.")]
	ZeroTimeout {
		/// Name of the offending setting.
		field: &'static str,
	},
	/// An access token cannot be encoded as an HTTP header value.
	#[error("Access token cannot be used as an Authorization header value.")]
	InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
	/// Request construction failed inside reqwest.
	#[error("Request could not be built.")]
	RequestBuild {
		/// Underlying builder failure.
		#[source]
		source: ReqwestError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Endpoint (or label) that was being called.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		let endpoint = e.url().map(|url| url.to_string()).unwrap_or_else(|| "<unknown>".into());

		Self::network(endpoint, e)
	}
}

/// Terminal outcome of a failed refresh cycle.
///
/// Every caller that joined the cycle receives a clone of the same value, so causes are shared
/// behind [`Arc`].
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// The credential store holds no refresh token; no network call was made.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// The refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh token with status {status}.")]
	Rejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
		/// Server-supplied message, when the body carried one.
		message: Option<String>,
	},
	/// The refresh call never produced a response.
	#[error("Refresh endpoint could not be reached.")]
	Network(#[source] Arc<TransportError>),
	/// The refresh endpoint answered 2xx with a body that does not carry a credential pair.
	#[error("Refresh endpoint returned a malformed response: {message}.")]
	MalformedResponse {
		/// Path-aware parsing failure summary.
		message: String,
	},
	/// The refresh call did not settle within the configured bound.
	#[error("Refresh call did not settle within {0:?}.")]
	TimedOut(Duration),
	/// The refreshed credential pair could not be written to the store.
	#[error("Refreshed credentials could not be persisted.")]
	Persist(#[source] StoreError),
	/// The session was ended or replaced while the refresh was in flight; its pair was discarded.
	#[error("Session changed while the refresh was in flight.")]
	Superseded,
	/// The refresh task stopped (runtime shutdown or panic) before the call settled.
	#[error("Refresh was abandoned before it settled.")]
	Abandoned,
}
impl RefreshError {
	/// Returns `true` for failures that clear the store and terminate the session.
	///
	/// [`RefreshError::Superseded`] and [`RefreshError::Abandoned`] leave the session as it is.
	pub fn terminates_session(&self) -> bool {
		!matches!(self, Self::Superseded | Self::Abandoned)
	}
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		Self::Network(Arc::new(e))
	}
}
