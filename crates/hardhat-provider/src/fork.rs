// SPDX-License-Identifier: GPL-3.0

//! Resolving the upstream network a forked node starts from.
//!
//! ```text
//! ethereum:mainnet-fork ──► ForkConfig ──► UpstreamRegistry ──► UpstreamProvider::connect
//!                           (provider,      (named provider      (must answer
//!                            block)          or default)          eth_chainId)
//!                                                   │
//!                                                   ▼
//!                                               ForkSpec ──► `hardhat node --fork ...`
//! ```
//!
//! All of this happens before a node process is spawned, so a missing or unreachable upstream
//! never leaves a process behind.

use crate::{
	Error,
	config::{Host, ProviderConfig},
	connection::{RpcClient, invalid_response},
	registry::Ecosystem,
	strings::rpc::methods,
};
use serde_json::{Map, Value, json};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use url::Url;

/// An archive node which a forked Hardhat node reads state from.
#[async_trait::async_trait]
pub trait UpstreamProvider: Send + Sync + fmt::Debug {
	/// Name used in the `upstream_provider` setting, e.g. `alchemy`.
	fn name(&self) -> &str;

	/// The URL passed to `hardhat node --fork`.
	fn connection_str(&self) -> &Url;

	/// Checks that the upstream is reachable and returns its chain id.
	async fn connect(&self) -> Result<u64, Error>;

	/// Hash of the upstream network's genesis block.
	async fn genesis_hash(&self) -> Result<String, Error>;
}

/// An upstream reached over plain JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcUpstream {
	name: String,
	url: Url,
	timeout: Duration,
}

impl RpcUpstream {
	/// Timeout of requests to the upstream unless set with [`RpcUpstream::with_timeout`].
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

	pub fn new(name: impl Into<String>, url: Url) -> Self {
		Self { name: name.into(), url, timeout: Self::DEFAULT_TIMEOUT }
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	fn client(&self) -> Result<RpcClient, Error> {
		RpcClient::new(self.url.clone(), self.timeout)
	}
}

#[async_trait::async_trait]
impl UpstreamProvider for RpcUpstream {
	fn name(&self) -> &str {
		&self.name
	}

	fn connection_str(&self) -> &Url {
		&self.url
	}

	async fn connect(&self) -> Result<u64, Error> {
		self.client()?.chain_id().await
	}

	async fn genesis_hash(&self) -> Result<String, Error> {
		genesis_hash(&self.client()?).await
	}
}

/// Hash of block 0 as reported by `client`.
pub(crate) async fn genesis_hash(client: &RpcClient) -> Result<String, Error> {
	let method = methods::ETH_GET_BLOCK_BY_NUMBER;
	let block = client.request(method, json!(["0x0", false])).await?;
	block
		.get("hash")
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| invalid_response(method, &block))
}

type NetworkKey = (Ecosystem, String);

/// The upstream providers available per upstream network.
///
/// The first provider registered for a network is its default unless another one is chosen with
/// [`UpstreamRegistry::set_default`].
#[derive(Debug, Default)]
pub struct UpstreamRegistry {
	providers: HashMap<NetworkKey, Vec<Arc<dyn UpstreamProvider>>>,
	defaults: HashMap<NetworkKey, String>,
}

impl UpstreamRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a provider for an upstream network, replacing one with the same name.
	///
	/// # Arguments
	/// * `ecosystem` - The ecosystem of the network.
	/// * `network` - The upstream network, e.g. `mainnet`.
	/// * `provider` - The provider.
	pub fn register(
		&mut self,
		ecosystem: Ecosystem,
		network: &str,
		provider: Arc<dyn UpstreamProvider>,
	) -> &mut Self {
		let providers = self.providers.entry((ecosystem, network.to_string())).or_default();
		providers.retain(|p| p.name() != provider.name());
		providers.push(provider);
		self
	}

	/// Makes `name` the default provider of an upstream network.
	pub fn set_default(&mut self, ecosystem: Ecosystem, network: &str, name: &str) -> &mut Self {
		self.defaults.insert((ecosystem, network.to_string()), name.to_string());
		self
	}

	/// Names of the providers registered for an upstream network.
	pub fn names(&self, ecosystem: Ecosystem, network: &str) -> Vec<&str> {
		self.providers
			.get(&(ecosystem, network.to_string()))
			.map(|providers| providers.iter().map(|p| p.name()).collect())
			.unwrap_or_default()
	}

	/// Looks up a provider by name, or the network's default when `name` is `None`.
	pub fn get(
		&self,
		ecosystem: Ecosystem,
		network: &str,
		name: Option<&str>,
	) -> Option<Arc<dyn UpstreamProvider>> {
		let key = (ecosystem, network.to_string());
		let providers = self.providers.get(&key)?;
		let name = name.or_else(|| self.defaults.get(&key).map(String::as_str));
		match name {
			Some(name) => providers.iter().find(|p| p.name() == name).cloned(),
			None => providers.first().cloned(),
		}
	}
}

/// The block a fork starts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockPin {
	/// The upstream's latest block at launch time. Not reproducible.
	#[default]
	Latest,
	Number(u64),
}

impl From<Option<u64>> for BlockPin {
	fn from(block_number: Option<u64>) -> Self {
		block_number.map_or(BlockPin::Latest, BlockPin::Number)
	}
}

/// Everything needed to launch and reset a forked node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkSpec {
	pub ecosystem: Ecosystem,
	/// The upstream network, e.g. `mainnet`.
	pub network: String,
	pub upstream_provider: String,
	pub upstream_url: Url,
	pub block: BlockPin,
	/// Whether `hardhat-deploy` scripts run on start.
	pub enable_deployments: bool,
}

impl ForkSpec {
	/// Parameters of `hardhat_reset` which re-forks the upstream.
	///
	/// # Arguments
	/// * `block_number` - Block to fork from, defaulting to the pinned block.
	pub fn reset_params(&self, block_number: Option<u64>) -> Value {
		let mut forking = Map::new();
		forking.insert("jsonRpcUrl".into(), Value::String(self.upstream_url.to_string()));
		let pinned = match self.block {
			BlockPin::Number(number) => Some(number),
			BlockPin::Latest => None,
		};
		if let Some(number) = block_number.or(pinned) {
			forking.insert("blockNumber".into(), json!(number));
		}
		json!([{ "forking": forking }])
	}
}

/// Turns the fork settings of an upstream network into a [`ForkSpec`].
///
/// # Arguments
/// * `config` - The provider configuration.
/// * `ecosystem` - The ecosystem of the upstream network.
/// * `network` - The upstream network, e.g. `mainnet`.
/// * `registry` - Available upstream providers.
/// * `host` - Where the forked node will listen.
pub async fn resolve(
	config: &ProviderConfig,
	ecosystem: Ecosystem,
	network: &str,
	registry: &UpstreamRegistry,
	host: &Host,
) -> Result<(ForkSpec, Arc<dyn UpstreamProvider>), Error> {
	let fork = config.fork_config(ecosystem.as_ref(), network);
	let requested = fork.upstream_provider.as_deref();
	let Some(upstream) = registry.get(ecosystem, network, requested) else {
		let available = registry.names(ecosystem, network);
		return Err(Error::UpstreamUnavailable {
			provider: requested.unwrap_or("default").to_string(),
			network: format!("{ecosystem}:{network}"),
			reason: if available.is_empty() {
				"no upstream providers are registered for this network".into()
			} else {
				format!("not registered, available providers: {}", available.join(", "))
			},
		});
	};

	if let Host::Uri(local) = host {
		if same_endpoint(local, upstream.connection_str()) {
			return Err(Error::Config(
				"Invalid upstream-fork URL. Can't be same as local Hardhat node.".into(),
			));
		}
	}

	let chain_id = upstream.connect().await.map_err(|e| Error::UpstreamUnavailable {
		provider: upstream.name().to_string(),
		network: format!("{ecosystem}:{network}"),
		reason: e.to_string(),
	})?;
	let block = BlockPin::from(fork.block_number);
	match block {
		BlockPin::Latest => log::info!(
			"Forking {ecosystem}:{network} (chain {chain_id}) from its latest block through `{}`. The forked state differs between runs; set `block_number` to pin it.",
			upstream.name()
		),
		BlockPin::Number(number) => log::info!(
			"Forking {ecosystem}:{network} (chain {chain_id}) at block {number} through `{}`.",
			upstream.name()
		),
	}

	let spec = ForkSpec {
		ecosystem,
		network: network.to_string(),
		upstream_provider: upstream.name().to_string(),
		upstream_url: upstream.connection_str().clone(),
		block,
		enable_deployments: fork.enable_hardhat_deployments,
	};
	Ok((spec, upstream))
}

fn same_endpoint(a: &Url, b: &Url) -> bool {
	let host = |url: &Url| url.host_str().map(|h| h.replace("localhost", "127.0.0.1"));
	host(a) == host(b) && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ConfigLoader;
	use mockito::Server;
	use std::fs;
	use tempfile::TempDir;

	fn config(toml: &str) -> anyhow::Result<(TempDir, ProviderConfig)> {
		let dir = TempDir::new()?;
		fs::write(dir.path().join(crate::config::CONFIG_FILE_NAME), toml)?;
		let config = ConfigLoader::new(dir.path()).data_dir(dir.path().join("data")).load()?;
		Ok((dir, config))
	}

	async fn upstream_server() -> mockito::ServerGuard {
		let mut server = Server::new_async().await;
		server
			.mock("POST", "/")
			.with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1" }).to_string())
			.create_async()
			.await;
		server
	}

	fn registry(name: &str, url: &str) -> anyhow::Result<UpstreamRegistry> {
		let mut registry = UpstreamRegistry::new();
		registry.register(
			Ecosystem::Ethereum,
			"mainnet",
			Arc::new(RpcUpstream::new(name, Url::parse(url)?)),
		);
		Ok(registry)
	}

	#[tokio::test]
	async fn resolve_defaults_to_latest_block() -> anyhow::Result<()> {
		let server = upstream_server().await;
		let (_dir, config) = config("")?;
		let registry = registry("geth", &server.url())?;
		let (spec, upstream) =
			resolve(&config, Ecosystem::Ethereum, "mainnet", &registry, &Host::Auto).await?;
		assert_eq!(spec.block, BlockPin::Latest);
		assert_eq!(spec.upstream_provider, "geth");
		assert!(!spec.enable_deployments);
		assert_eq!(upstream.name(), "geth");
		Ok(())
	}

	#[tokio::test]
	async fn resolve_uses_configured_provider_and_block() -> anyhow::Result<()> {
		let server = upstream_server().await;
		let (_dir, config) = config(
			r#"
			[hardhat.fork.ethereum.mainnet]
			upstream_provider = "infura"
			block_number = 17040366
			enable_hardhat_deployments = true
			"#,
		)?;
		let mut registry = registry("geth", "http://127.0.0.1:1")?;
		registry.register(
			Ecosystem::Ethereum,
			"mainnet",
			Arc::new(RpcUpstream::new("infura", Url::parse(&server.url())?)),
		);
		let (spec, _) =
			resolve(&config, Ecosystem::Ethereum, "mainnet", &registry, &Host::Auto).await?;
		assert_eq!(spec.upstream_provider, "infura");
		assert_eq!(spec.block, BlockPin::Number(17_040_366));
		assert!(spec.enable_deployments);
		Ok(())
	}

	#[tokio::test]
	async fn resolve_fails_for_unregistered_provider() -> anyhow::Result<()> {
		let (_dir, config) = config(
			r#"
			[hardhat.fork.ethereum.mainnet]
			upstream_provider = "alchemy"
			"#,
		)?;
		let registry = registry("geth", "http://127.0.0.1:1")?;
		let result = resolve(&config, Ecosystem::Ethereum, "mainnet", &registry, &Host::Auto).await;
		match result {
			Err(Error::UpstreamUnavailable { provider, network, reason }) => {
				assert_eq!(provider, "alchemy");
				assert_eq!(network, "ethereum:mainnet");
				assert!(reason.contains("geth"));
			},
			other => panic!("unexpected result: {other:?}"),
		}
		Ok(())
	}

	#[tokio::test]
	async fn resolve_fails_for_unreachable_upstream() -> anyhow::Result<()> {
		let (_dir, config) = config("")?;
		let port = hardhat_common::PortReservation::reserve()?.port();
		let registry = registry("geth", &format!("http://127.0.0.1:{port}"))?;
		let result = resolve(&config, Ecosystem::Ethereum, "mainnet", &registry, &Host::Auto).await;
		assert!(matches!(result, Err(Error::UpstreamUnavailable { .. })));
		Ok(())
	}

	#[tokio::test]
	async fn resolve_rejects_upstream_equal_to_local_node() -> anyhow::Result<()> {
		let (_dir, config) = config("")?;
		let registry = registry("geth", "http://localhost:8545")?;
		let host = Host::Uri(Url::parse("http://127.0.0.1:8545")?);
		let result = resolve(&config, Ecosystem::Ethereum, "mainnet", &registry, &host).await;
		assert!(matches!(result, Err(Error::Config(..))));
		Ok(())
	}

	#[test]
	fn registry_default_selection() -> anyhow::Result<()> {
		let mut registry = registry("geth", "http://127.0.0.1:1")?;
		registry.register(
			Ecosystem::Ethereum,
			"mainnet",
			Arc::new(RpcUpstream::new("alchemy", Url::parse("https://eth.example.com")?)),
		);
		let default = registry.get(Ecosystem::Ethereum, "mainnet", None).map(|p| p.name().to_string());
		assert_eq!(default.as_deref(), Some("geth"));
		registry.set_default(Ecosystem::Ethereum, "mainnet", "alchemy");
		let default = registry.get(Ecosystem::Ethereum, "mainnet", None).map(|p| p.name().to_string());
		assert_eq!(default.as_deref(), Some("alchemy"));
		assert!(registry.get(Ecosystem::Ethereum, "sepolia", None).is_none());
		assert_eq!(registry.names(Ecosystem::Ethereum, "mainnet"), vec!["geth", "alchemy"]);
		Ok(())
	}

	#[test]
	fn reset_params_use_pinned_block() -> anyhow::Result<()> {
		let spec = ForkSpec {
			ecosystem: Ecosystem::Ethereum,
			network: "mainnet".into(),
			upstream_provider: "geth".into(),
			upstream_url: Url::parse("https://eth.example.com/rpc")?,
			block: BlockPin::Number(100),
			enable_deployments: false,
		};
		assert_eq!(
			spec.reset_params(None),
			json!([{ "forking": { "jsonRpcUrl": "https://eth.example.com/rpc", "blockNumber": 100 } }])
		);
		assert_eq!(spec.reset_params(Some(7))[0]["forking"]["blockNumber"], json!(7));
		let latest = ForkSpec { block: BlockPin::Latest, ..spec };
		assert_eq!(
			latest.reset_params(None),
			json!([{ "forking": { "jsonRpcUrl": "https://eth.example.com/rpc" } }])
		);
		Ok(())
	}
}
