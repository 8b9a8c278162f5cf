#![cfg(feature = "reqwest")]

//! Lease registry lifecycle tests against a mock secret service.

// std
use std::time::Duration as StdDuration;

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use lease_broker::{
	http::{AuthorizedTransport, ReqwestTransport, StaticTokenSource},
	lease::SecretLeaseContainer,
	schedule::RenewalSettings,
	url::Url,
};
use time::Duration;

type Container = SecretLeaseContainer<AuthorizedTransport<ReqwestTransport>>;

fn container(server: &MockServer) -> color_eyre::Result<Container> {
	let transport = AuthorizedTransport::new(
		ReqwestTransport::new(Url::parse(&server.base_url())?),
		std::sync::Arc::new(StaticTokenSource::new("static-token")),
	);
	let container = SecretLeaseContainer::new(transport);

	// A 3s lease with a 2s threshold renews after 1s.
	container
		.set_renewal_settings(RenewalSettings::new(Duration::seconds(1), Duration::seconds(2))?);

	Ok(container)
}

#[tokio::test]
async fn scheduled_renewal_fires_with_the_session_token() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let fetch = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/database/creds/app")
				.header("x-vault-token", "static-token");
			then.status(200).json_body(json!({
				"lease_id": "lease-1",
				"renewable": true,
				"lease_duration": 3,
				"data": { "username": "app-user", "password": "app-pass" },
			}));
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/sys/leases/renew")
				.header("x-vault-token", "static-token")
				.json_body(json!({ "lease_id": "lease-1", "increment": 3 }));
			then.status(200).json_body(json!({
				"lease_id": "lease-1",
				"renewable": true,
				"lease_duration": 3,
			}));
		})
		.await;
	let container = container(&server)?;

	container.request_renewable_secret("database/creds/app").await?;
	container.start().await;

	let data = container.snapshot("database/creds/app")?;

	assert_eq!(data["username"], json!("app-user"));

	tokio::time::sleep(StdDuration::from_millis(1_500)).await;

	fetch.assert_async().await;

	assert!(renew.hits_async().await >= 1);
	assert!(container.metrics().successes() >= 1);

	container.stop();

	Ok(())
}

#[tokio::test]
async fn shutdown_revokes_the_outstanding_lease() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/database/creds/app");
			then.status(200).json_body(json!({
				"lease_id": "lease-1",
				"renewable": true,
				"lease_duration": 3_600,
				"data": { "username": "app-user" },
			}));
		})
		.await;

	let revoke = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/sys/leases/revoke")
				.json_body(json!({ "lease_id": "lease-1" }));
			then.status(204);
		})
		.await;
	let container = container(&server)?;

	container.request_renewable_secret("database/creds/app").await?;
	container.start().await;
	container.shutdown().await;

	revoke.assert_async().await;

	assert!(container.status("database/creds/app").is_err());

	Ok(())
}
