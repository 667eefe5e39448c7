//! Shared fixtures for the integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use parking_lot::Mutex;
// self
use bearer_session::{
	auth::CredentialPair,
	client::SessionClient,
	config::ClientConfig,
	session::LoginRedirect,
	store::{CredentialStore, MemoryStore},
};

/// Redirect hook that records every entry point it was asked to open.
#[derive(Clone, Debug, Default)]
pub struct RecordingRedirect(Arc<Mutex<Vec<String>>>);
impl RecordingRedirect {
	pub fn count(&self) -> usize {
		self.0.lock().len()
	}

	pub fn entries(&self) -> Vec<String> {
		self.0.lock().clone()
	}
}
impl LoginRedirect for RecordingRedirect {
	fn redirect_to_login(&self, entry_point: &str) {
		self.0.lock().push(entry_point.to_owned());
	}
}

pub fn pair(access: &str, refresh: &str) -> CredentialPair {
	CredentialPair::new(access, refresh)
}

pub fn envelope(access: &str, refresh: &str) -> String {
	serde_json::json!({
		"success": true,
		"data": { "tokens": { "accessToken": access, "refreshToken": refresh } },
	})
	.to_string()
}

pub fn build_test_client(
	base_url: &str,
	seed: Option<CredentialPair>,
) -> (SessionClient, Arc<MemoryStore>, RecordingRedirect) {
	let store = Arc::new(seed.map(MemoryStore::with_pair).unwrap_or_default());
	let redirect = RecordingRedirect::default();
	let config = ClientConfig::parse(base_url).expect("Mock base URL should parse successfully.");
	let client = SessionClient::new(
		config,
		store.clone() as Arc<dyn CredentialStore>,
		Arc::new(redirect.clone()),
	)
	.expect("Session client should build against the mock server.");

	(client, store, redirect)
}
