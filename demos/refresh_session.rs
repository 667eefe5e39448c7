//! Demonstrates transparent recovery from an expired access token: the first call is rejected,
//! the client refreshes once, and the replayed call succeeds with the new token.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use bearer_session::{
	auth::CredentialPair,
	client::SessionClient,
	config::ClientConfig,
	session::LoginRedirect,
	store::{CredentialStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/buildings").header("authorization", "Bearer stale-access");
			then.status(401).header("content-type", "application/json").body(
				"{\"success\":false,\"message\":\"Token expired\"}",
			);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").json_body(serde_json::json!({
				"refreshToken": "demo-refresh",
			}));
			then.status(200).header("content-type", "application/json").body(
				"{\"success\":true,\"data\":{\"tokens\":{\"accessToken\":\"fresh-access\",\"refreshToken\":\"rotated-refresh\"}}}",
			);
		})
		.await;
	let buildings = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/buildings").header("authorization", "Bearer fresh-access");
			then.status(200).header("content-type", "application/json").body("{\"data\":[]}");
		})
		.await;
	let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("stale-access", "demo-refresh")));
	let redirect: Arc<dyn LoginRedirect> =
		Arc::new(|entry_point: &str| println!("Redirecting to {entry_point}."));
	let client = SessionClient::new(
		ClientConfig::parse(&server.url("/api"))?,
		store.clone() as Arc<dyn CredentialStore>,
		redirect,
	)?;
	let response = client.send(client.get("buildings")?).await?;

	println!("Status after transparent refresh: {}.", response.status());
	println!("Refresh calls issued: {}.", client.refresh_metrics().attempts());

	expired.assert_async().await;
	refresh.assert_async().await;
	buildings.assert_async().await;

	Ok(())
}
