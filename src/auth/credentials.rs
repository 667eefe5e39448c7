//! The access/refresh credential pair owned by the credential store.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access/refresh token pair issued on login, registration, and every successful refresh.
///
/// The pair is always replaced as a whole; the serialized field names match the two durable
/// entries (`accessToken`, `refreshToken`) the API and the file store use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
	/// Short-lived token stamped onto outgoing requests.
	pub access_token: TokenSecret,
	/// Longer-lived token used solely to obtain a new pair.
	pub refresh_token: TokenSecret,
}
impl CredentialPair {
	/// Creates a pair from raw token strings.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
		}
	}

	/// Returns the access token when it carries material.
	pub fn access(&self) -> Option<&TokenSecret> {
		Some(&self.access_token).filter(|secret| !secret.is_empty())
	}

	/// Returns the refresh token when it carries material.
	pub fn refresh(&self) -> Option<&TokenSecret> {
		Some(&self.refresh_token).filter(|secret| !secret.is_empty())
	}
}
