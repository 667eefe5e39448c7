//! Stamps bearer tokens onto outgoing requests.

// crates.io
use reqwest::header::{AUTHORIZATION, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenSecret},
	error::ConfigError,
	store::CredentialStore,
};

/// Attaches `Authorization: Bearer <access token>` from the credential store.
///
/// Reads the store on every call and never writes to it. Requests are left untouched when no
/// (non-empty) access token is stored.
#[derive(Clone)]
pub struct RequestAuthenticator {
	store: Arc<dyn CredentialStore>,
}
impl RequestAuthenticator {
	/// Creates an authenticator reading from `store`.
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self { store }
	}

	/// Stamps the currently stored access token, if any.
	pub fn authenticate(&self, request: &mut Request) -> Result<(), ConfigError> {
		let pair = self.store.get();

		match pair.as_ref().and_then(CredentialPair::access) {
			Some(token) => stamp(request, token),
			None => Ok(()),
		}
	}

	/// Stamps an explicit token, replacing any existing `Authorization` header.
	pub fn authenticate_with(
		&self,
		request: &mut Request,
		token: &TokenSecret,
	) -> Result<(), ConfigError> {
		stamp(request, token)
	}
}
impl Debug for RequestAuthenticator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestAuthenticator").finish_non_exhaustive()
	}
}

fn stamp(request: &mut Request, token: &TokenSecret) -> Result<(), ConfigError> {
	let mut value = HeaderValue::from_str(&token.bearer())?;

	value.set_sensitive(true);
	request.headers_mut().insert(AUTHORIZATION, value);

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn request() -> Request {
		Request::new(
			Method::GET,
			Url::parse("http://localhost/api/buildings").expect("Fixture URL should parse."),
		)
	}

	fn header(request: &Request) -> Option<&str> {
		request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok())
	}

	#[test]
	fn stamps_stored_access_token() {
		let store = MemoryStore::with_pair(CredentialPair::new("t1", "r1"));
		let authenticator = RequestAuthenticator::new(Arc::new(store));
		let mut request = request();

		authenticator.authenticate(&mut request).expect("Stamping a valid token should succeed.");

		assert_eq!(header(&request), Some("Bearer t1"));
		assert!(request.headers().get(AUTHORIZATION).is_some_and(HeaderValue::is_sensitive));
	}

	#[test]
	fn leaves_request_untouched_without_token() {
		let authenticator = RequestAuthenticator::new(Arc::new(MemoryStore::default()));
		let mut request = request();

		authenticator.authenticate(&mut request).expect("Empty store should not fail.");

		assert_eq!(header(&request), None);

		let blank = RequestAuthenticator::new(Arc::new(MemoryStore::with_pair(
			CredentialPair::new("", "r1"),
		)));

		blank.authenticate(&mut request).expect("Blank access token should not fail.");

		assert_eq!(header(&request), None);
	}

	#[test]
	fn explicit_token_replaces_existing_header() {
		let store = MemoryStore::with_pair(CredentialPair::new("t1", "r1"));
		let authenticator = RequestAuthenticator::new(Arc::new(store.clone()));
		let mut request = request();

		authenticator.authenticate(&mut request).expect("Stamping a valid token should succeed.");
		authenticator
			.authenticate_with(&mut request, &TokenSecret::new("t2"))
			.expect("Stamping an explicit token should succeed.");

		assert_eq!(header(&request), Some("Bearer t2"));
		assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
		assert_eq!(store.get().map(|pair| pair.access_token), Some(TokenSecret::new("t1")));
	}

	#[test]
	fn rejects_tokens_that_are_not_header_safe() {
		let authenticator = RequestAuthenticator::new(Arc::new(MemoryStore::default()));
		let mut request = request();
		let err = authenticator
			.authenticate_with(&mut request, &TokenSecret::new("bad\ntoken"))
			.expect_err("Control characters should be rejected.");

		assert!(matches!(err, ConfigError::InvalidHeader(_)));
	}
}
