// SPDX-License-Identifier: GPL-3.0

//! JSON-RPC over HTTP and waiting for a node to accept requests.

use crate::{
	Error,
	strings::{
		node::CLIENT_VERSION_MARKER,
		rpc::{JSONRPC_VERSION, methods},
	},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use url::Url;

/// First delay between readiness polls.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Upper bound of the delay between readiness polls.
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct Response {
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
	code: i64,
	message: String,
	#[serde(default)]
	data: Option<Value>,
}

/// A minimal JSON-RPC client for a single HTTP endpoint.
#[derive(Debug)]
pub struct RpcClient {
	client: reqwest::Client,
	endpoint: Url,
	next_id: AtomicU64,
}

impl RpcClient {
	/// Creates a client for `endpoint`.
	///
	/// # Arguments
	/// * `endpoint` - The HTTP endpoint of the node.
	/// * `timeout` - Timeout of each request.
	pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, Error> {
		let client = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self { client, endpoint, next_id: AtomicU64::new(1) })
	}

	/// The endpoint requests are sent to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Sends a request and returns its `result`.
	///
	/// An error object in the response is returned as [`Error::Rpc`], unmodified.
	///
	/// # Arguments
	/// * `method` - The JSON-RPC method.
	/// * `params` - The parameters, passed through as is.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let payload = json!({
			"jsonrpc": JSONRPC_VERSION,
			"id": id,
			"method": method,
			"params": params,
		});
		log::trace!("-> {method} {params}");
		let response: Response =
			self.client.post(self.endpoint.clone()).json(&payload).send().await?.json().await?;
		if let Some(ErrorObject { code, message, data }) = response.error {
			return Err(Error::Rpc { method: method.to_string(), code, message, data });
		}
		Ok(response.result.unwrap_or(Value::Null))
	}

	/// `web3_clientVersion` of the node.
	pub async fn client_version(&self) -> Result<String, Error> {
		let method = methods::WEB3_CLIENT_VERSION;
		match self.request(method, json!([])).await? {
			Value::String(version) => Ok(version),
			other => Err(invalid_response(method, &other)),
		}
	}

	/// `eth_chainId` of the node.
	pub async fn chain_id(&self) -> Result<u64, Error> {
		let method = methods::ETH_CHAIN_ID;
		let result = self.request(method, json!([])).await?;
		parse_quantity(method, &result)
	}
}

/// Parses a hex-encoded quantity such as `0x7a69`.
pub(crate) fn parse_quantity(method: &str, value: &Value) -> Result<u64, Error> {
	value
		.as_str()
		.and_then(|hex| hex.strip_prefix("0x"))
		.and_then(|digits| u64::from_str_radix(digits, 16).ok())
		.ok_or_else(|| invalid_response(method, value))
}

pub(crate) fn invalid_response(method: &str, value: &Value) -> Error {
	Error::InvalidResponse { method: method.to_string(), message: format!("unexpected result {value}") }
}

/// Asks the node at the client's endpoint for its version and checks that it is Hardhat.
///
/// A node that answers but is not Hardhat fails with [`Error::NotHardhatNode`]. Any other error
/// means nothing usable answered.
pub async fn probe_hardhat(client: &RpcClient) -> Result<String, Error> {
	let not_hardhat = || Error::NotHardhatNode { uri: client.endpoint().to_string() };
	match client.client_version().await {
		Ok(version) if version.to_lowercase().contains(CLIENT_VERSION_MARKER) => Ok(version),
		Ok(_) | Err(Error::Rpc { .. } | Error::InvalidResponse { .. }) => Err(not_hardhat()),
		Err(Error::HttpError(e)) if e.is_decode() => Err(not_hardhat()),
		Err(e) => Err(e),
	}
}

/// Polls the client's endpoint until a Hardhat node answers.
///
/// The delay between polls starts at [`INITIAL_BACKOFF`] and doubles up to [`MAX_BACKOFF`].
/// Before each poll `alive` is called, so a launched process that died fails the wait early.
/// Returns the node's client version.
///
/// # Arguments
/// * `client` - Client for the node's endpoint.
/// * `timeout` - Overall time budget.
/// * `cancel` - Aborts the wait with [`Error::Cancelled`].
/// * `alive` - Checks the launched process, if any.
pub async fn wait_until_ready<F>(
	client: &RpcClient,
	timeout: Duration,
	cancel: &CancellationToken,
	mut alive: F,
) -> Result<String, Error>
where
	F: FnMut() -> Result<(), Error>,
{
	let timed_out = || Error::ConnectionTimeout {
		uri: client.endpoint().as_str().trim_end_matches('/').to_string(),
		timeout,
	};
	let deadline = Instant::now() + timeout;
	let mut delay = INITIAL_BACKOFF;
	loop {
		alive()?;
		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(timed_out());
		}
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			result = tokio::time::timeout(remaining, probe_hardhat(client)) => match result {
				Ok(Ok(version)) => return Ok(version),
				Ok(Err(e @ Error::NotHardhatNode { .. })) => return Err(e),
				Ok(Err(e)) => log::trace!("{} not ready: {e}", client.endpoint()),
				Err(_) => return Err(timed_out()),
			},
		}

		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(timed_out());
		}
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			_ = sleep(delay.min(remaining)) => {},
		}
		delay = (delay * 2).min(MAX_BACKOFF);
	}
}
