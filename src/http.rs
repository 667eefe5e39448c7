//! Transport primitives for the credential endpoints.
//!
//! The module exposes [`TokenRefresher`], the only seam through which the refresh coordinator
//! touches the network, plus the reqwest-backed [`ReqwestRefresher`] and the envelope parsing
//! shared with login and registration. Refresh calls are issued on a bare client and never pass
//! through the response interceptor, so a 401 from the refresh endpoint cannot re-enter the
//! coordinator.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenSecret},
	error::{ConfigError, RefreshError, TransportError},
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<CredentialPair, RefreshError>> + 'a + Send>>;

/// Performs a single refresh call, exchanging a refresh token for a new credential pair.
///
/// Implementations must not retry: a failed call is terminal for the current refresh cycle.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Exchanges `refresh_token` for a new pair.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a>;
}

/// Reqwest-backed [`TokenRefresher`] posting `{"refreshToken": ..}` to the refresh endpoint.
#[derive(Clone, Debug)]
pub struct ReqwestRefresher {
	client: ReqwestClient,
	endpoint: Url,
}
impl ReqwestRefresher {
	/// Wraps an existing client; `endpoint` is the absolute refresh URL.
	pub fn new(client: ReqwestClient, endpoint: Url) -> Self {
		Self { client, endpoint }
	}

	/// Returns the refresh endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}
}
impl TokenRefresher for ReqwestRefresher {
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async move {
			let body = RefreshRequest { refresh_token: refresh_token.expose() };
			let (status, bytes) = post_json(&self.client, self.endpoint.clone(), &body).await?;

			if !status.is_success() {
				return Err(RefreshError::Rejected {
					status: status.as_u16(),
					message: error_message(&bytes),
				});
			}

			parse_tokens(&bytes).map_err(|message| RefreshError::MalformedResponse { message })
		})
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
	refresh_token: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
	data: T,
}

#[derive(Deserialize)]
struct TokensData {
	tokens: CredentialPair,
}

#[derive(Deserialize)]
struct ErrorBody {
	message: Option<String>,
}

/// Builds the bare client used for credential endpoints and request dispatch.
pub(crate) fn build_client(request_timeout: Option<Duration>) -> Result<ReqwestClient, ConfigError> {
	let mut builder = ReqwestClient::builder();

	if let Some(timeout) = request_timeout {
		builder = builder.timeout(timeout);
	}

	builder.build().map_err(ConfigError::http_client_build)
}

/// Posts a JSON body and buffers the response.
pub(crate) async fn post_json<T>(
	client: &ReqwestClient,
	url: Url,
	body: &T,
) -> Result<(StatusCode, Vec<u8>), TransportError>
where
	T: ?Sized + Serialize,
{
	let response = client.post(url).json(body).send().await?;
	let status = response.status();
	let bytes = response.bytes().await?;

	Ok((status, bytes.to_vec()))
}

/// Extracts `data.tokens` from a credential endpoint's success body.
///
/// Errors carry the JSON path of the first mismatch. A pair with an empty token is rejected.
pub(crate) fn parse_tokens(bytes: &[u8]) -> Result<CredentialPair, String> {
	let mut de = serde_json::Deserializer::from_slice(bytes);
	let envelope: Envelope<TokensData> =
		serde_path_to_error::deserialize(&mut de).map_err(|e| e.to_string())?;
	let pair = envelope.data.tokens;

	if pair.access().is_none() || pair.refresh().is_none() {
		return Err("data.tokens: credential pair contains an empty token".into());
	}

	Ok(pair)
}

/// Reads the `message` field of an error body, if the body is JSON and carries one.
pub(crate) fn error_message(bytes: &[u8]) -> Option<String> {
	serde_json::from_slice::<ErrorBody>(bytes).ok().and_then(|body| body.message)
}
