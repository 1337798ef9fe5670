// SPDX-License-Identifier: GPL-3.0

//! The provider facade used by the host tool.

use crate::{
	Error,
	config::{Host, ProviderConfig, local_url},
	connection::{self, RpcClient, parse_quantity},
	fork::{self, ForkSpec, UpstreamProvider, UpstreamRegistry},
	hardhat_config, package,
	process::{self, NodeProcess},
	registry::{Ecosystem, NetworkKind, NetworkSelector},
	strings::{node::HARDHAT_DEPLOY_PLUGIN, rpc::methods},
};
use hardhat_common::PortReservation;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc, time::Duration};
use strum_macros::Display;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Lifecycle of a [`HardhatProvider`].
///
/// `Unconnected → Connecting → Ready → Disconnected`, or `Connecting → Failed`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ProviderState {
	Unconnected,
	Connecting,
	Ready,
	Disconnected,
	Failed,
}

#[derive(Debug)]
enum Target {
	Local,
	Fork { network: String, registry: Arc<UpstreamRegistry> },
}

/// A single frame of `debug_traceTransaction`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceFrame {
	pub pc: u64,
	pub op: String,
	pub gas: u64,
	pub gas_cost: u64,
	pub depth: u64,
	#[serde(default)]
	pub stack: Vec<String>,
	#[serde(default)]
	pub memory: Vec<String>,
	#[serde(default)]
	pub storage: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trace {
	#[serde(default)]
	struct_logs: Vec<TraceFrame>,
}

/// Runs, connects to and drives a Hardhat development node.
///
/// A provider either serves a fresh local chain or forks an upstream network. It owns the node
/// process it launched and stops it on [`HardhatProvider::disconnect`]; a node that was already
/// running is used as is and left untouched.
///
/// ```no_run
/// # async fn run() -> Result<(), hardhat_provider::Error> {
/// use hardhat_provider::{ConfigLoader, Ecosystem, HardhatProvider};
///
/// let config = ConfigLoader::new(".").load()?;
/// let mut provider = HardhatProvider::new(config, Ecosystem::Ethereum);
/// provider.connect().await?;
/// provider.mine(5).await?;
/// provider.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HardhatProvider {
	config: ProviderConfig,
	ecosystem: Ecosystem,
	target: Target,
	state: ProviderState,
	uri: Option<Url>,
	client: Option<RpcClient>,
	process: Option<NodeProcess>,
	fork: Option<ForkSpec>,
	upstream: Option<Arc<dyn UpstreamProvider>>,
}

impl HardhatProvider {
	/// A provider for the `local` network of an ecosystem.
	pub fn new(config: ProviderConfig, ecosystem: Ecosystem) -> Self {
		Self::with_target(config, ecosystem, Target::Local)
	}

	/// A provider forking an upstream network.
	///
	/// # Arguments
	/// * `config` - The provider configuration.
	/// * `ecosystem` - The ecosystem of the upstream network.
	/// * `network` - The upstream network, e.g. `mainnet` (or `mainnet-fork`).
	/// * `registry` - Upstream providers to fork from.
	pub fn fork(
		config: ProviderConfig,
		ecosystem: Ecosystem,
		network: &str,
		registry: Arc<UpstreamRegistry>,
	) -> Result<Self, Error> {
		let network = network.strip_suffix(crate::registry::FORK_SUFFIX).unwrap_or(network);
		if !ecosystem.can_fork(network) {
			return Err(Error::Config(format!(
				"Network `{network}` of ecosystem `{ecosystem}` cannot be forked."
			)));
		}
		let target = Target::Fork { network: network.to_string(), registry };
		Ok(Self::with_target(config, ecosystem, target))
	}

	/// A provider for a network chosen with a selector such as `ethereum:mainnet-fork:hardhat`.
	pub fn from_selector(
		config: ProviderConfig,
		selector: &NetworkSelector,
		registry: Arc<UpstreamRegistry>,
	) -> Result<Self, Error> {
		match &selector.kind {
			NetworkKind::Local => Ok(Self::new(config, selector.ecosystem)),
			NetworkKind::Fork { upstream } => Self::fork(config, selector.ecosystem, upstream, registry),
		}
	}

	fn with_target(config: ProviderConfig, ecosystem: Ecosystem, target: Target) -> Self {
		Self {
			config,
			ecosystem,
			target,
			state: ProviderState::Unconnected,
			uri: None,
			client: None,
			process: None,
			fork: None,
			upstream: None,
		}
	}

	pub fn state(&self) -> ProviderState {
		self.state
	}

	pub fn is_connected(&self) -> bool {
		self.state == ProviderState::Ready
	}

	pub fn ecosystem(&self) -> Ecosystem {
		self.ecosystem
	}

	/// The node's endpoint: the one in use once connected, otherwise the configured one.
	/// `None` before connecting with an `auto` host.
	pub fn uri(&self) -> Option<Url> {
		if let Some(uri) = &self.uri {
			return Some(uri.clone());
		}
		match self.host() {
			Ok(Host::Uri(uri)) => Some(uri),
			_ => None,
		}
	}

	/// Id of the node process launched by this provider.
	pub fn process_id(&self) -> Option<u32> {
		self.process.as_ref().and_then(NodeProcess::id)
	}

	/// The resolved fork, once connected to a forked node.
	pub fn fork_spec(&self) -> Option<&ForkSpec> {
		self.fork.as_ref()
	}

	/// Time allowed for a launched node to become ready.
	///
	/// This bounds a single start attempt. With an `auto` host a timed out attempt is retried on a
	/// fresh port up to `process_attempts` times, so a whole [`HardhatProvider::connect`] may take
	/// that many times longer.
	pub fn timeout(&self) -> Duration {
		match self.target {
			Target::Local => self.config.request_timeout,
			Target::Fork { .. } => self.config.fork_request_timeout,
		}
	}

	fn host(&self) -> Result<Host, Error> {
		match &self.target {
			Target::Local => Ok(self.config.host.clone()),
			Target::Fork { network, .. } => {
				let fork = self.config.fork_config(self.ecosystem.as_ref(), network);
				self.config.fork_host(&fork)
			},
		}
	}

	/// Connects to the node, launching one if needed. Does nothing when already connected.
	pub async fn connect(&mut self) -> Result<(), Error> {
		self.connect_with_cancel(&CancellationToken::new()).await
	}

	/// Like [`HardhatProvider::connect`], aborting with [`Error::Cancelled`] once `cancel` fires.
	///
	/// Any node launched by the attempt is stopped before an error is returned.
	pub async fn connect_with_cancel(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
		match self.state {
			ProviderState::Ready => return Ok(()),
			ProviderState::Failed => return Err(Error::ProviderFailed),
			_ => {},
		}
		self.state = ProviderState::Connecting;
		let connected = match self.establish(cancel).await {
			Ok(()) => self.check_fork_genesis(cancel).await,
			Err(e) => Err(e),
		};
		match connected {
			Ok(()) => {
				self.state = ProviderState::Ready;
				Ok(())
			},
			Err(e) => {
				self.teardown().await;
				self.state = ProviderState::Failed;
				Err(e)
			},
		}
	}

	async fn establish(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
		let host = self.host()?;
		let timeout = self.timeout();
		if let Target::Fork { network, registry } = &self.target {
			let resolve = fork::resolve(&self.config, self.ecosystem, network, registry, &host);
			let (spec, upstream) = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				resolved = resolve => resolved?,
			};
			self.fork = Some(spec);
			self.upstream = Some(upstream);
		}

		let uri = match host {
			Host::Auto => {
				if !self.config.manage_process {
					return Err(Error::Config(
						"An `auto` host requires `manage_process` to be enabled.".into(),
					));
				}
				return self.launch_on_free_port(timeout, cancel).await;
			},
			Host::Uri(uri) => uri,
		};

		let client = RpcClient::new(uri.clone(), timeout)?;
		let existing = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			result = connection::probe_hardhat(&client) => result,
		};
		match existing {
			Ok(version) => {
				log::info!("Connecting to existing '{version}' node at '{uri}'.");
				self.uri = Some(uri);
				self.client = Some(client);
				return Ok(());
			},
			Err(e @ Error::NotHardhatNode { .. }) => return Err(e),
			Err(e) => log::debug!("No node answering at '{uri}': {e}"),
		}

		if !self.config.manage_process || !Host::Uri(uri.clone()).is_local() {
			return Err(Error::Connection {
				uri: uri.to_string(),
				message: "no Hardhat node is running at this host".into(),
			});
		}
		let Some(port) = uri.port_or_known_default() else {
			return Err(Error::Config(format!("Host '{uri}' has no port.")));
		};
		self.launch(uri, port, None, timeout, cancel).await
	}

	async fn launch_on_free_port(
		&mut self,
		timeout: Duration,
		cancel: &CancellationToken,
	) -> Result<(), Error> {
		let attempts = self.config.process_attempts;
		let mut last_error = None;
		for attempt in 1..=attempts {
			let reservation = PortReservation::reserve()?;
			let port = reservation.port();
			let uri = local_url(port)?;
			match self.launch(uri, port, Some(reservation), timeout, cancel).await {
				Ok(()) => return Ok(()),
				Err(
					e @ (Error::NotInstalled |
					Error::Cancelled |
					Error::Config(..) |
					Error::NotHardhatNode { .. }),
				) => return Err(e),
				Err(e) => {
					log::warn!("Attempt {attempt}/{attempts} to start a Hardhat node failed: {e}");
					last_error = Some(e);
				},
			}
		}
		Err(last_error.unwrap_or_else(|| Error::Launch("no start attempts were made".into())))
	}

	async fn launch(
		&mut self,
		uri: Url,
		port: u16,
		reservation: Option<PortReservation>,
		timeout: Duration,
		cancel: &CancellationToken,
	) -> Result<(), Error> {
		let project_dir = &self.config.project_dir;
		let binary = process::locate_binary(self.config.bin_path.as_deref(), project_dir)?;
		let config_path = hardhat_config::resolve_path(
			self.config.hardhat_config_file.as_deref(),
			&self.config.data_dir,
		);
		let config_file =
			hardhat_config::ensure(&config_path, &self.config.accounts, &self.config.hard_fork)?;
		let no_deploy = match &self.fork {
			Some(fork) if !fork.enable_deployments => package::hardhat_plugins(project_dir)
				.unwrap_or_else(|e| {
					log::warn!("Unable to read the project's Hardhat plugins: {e}");
					vec![]
				})
				.iter()
				.any(|plugin| plugin == HARDHAT_DEPLOY_PLUGIN),
			_ => false,
		};
		let args = process::build_args(port, &config_file, self.fork.as_ref(), no_deploy);

		log::info!("Starting Hardhat node at '{uri}'.");
		let mut node = NodeProcess::spawn(&binary, &args, port, reservation)?;
		let client = RpcClient::new(uri.clone(), timeout)?;
		let ready =
			connection::wait_until_ready(&client, timeout, cancel, || node.ensure_running()).await;
		match ready {
			Ok(version) => {
				log::info!("Connected to '{version}' node at '{uri}' (pid {:?}).", node.id());
				self.process = Some(node);
				self.client = Some(client);
				self.uri = Some(uri);
				Ok(())
			},
			Err(e) => {
				node.terminate().await;
				if !matches!(e, Error::ConnectionTimeout { .. }) || self.config.bin_path.is_some() {
					return Err(e);
				}
				let installed = tokio::select! {
					biased;
					_ = cancel.cancelled() => return Err(Error::Cancelled),
					installed = process::hardhat_installed(project_dir) => installed,
				};
				match installed {
					Some(false) => Err(Error::NotInstalled),
					_ => Err(e),
				}
			},
		}
	}

	/// Warns when a forked node and its upstream disagree on the genesis block. Only
	/// cancellation fails the check.
	async fn check_fork_genesis(&self, cancel: &CancellationToken) -> Result<(), Error> {
		let (Some(upstream), Some(client)) = (&self.upstream, &self.client) else {
			return Ok(());
		};
		let genesis = async { tokio::try_join!(fork::genesis_hash(client), upstream.genesis_hash()) };
		let hashes = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			hashes = genesis => hashes,
		};
		match hashes {
			Ok((local, upstream)) if local != upstream => log::warn!(
				"Upstream network has mismatching genesis block. This could be an issue with hardhat."
			),
			Ok(_) => {},
			Err(e) => log::warn!("Unable to compare genesis blocks with the upstream network: {e}"),
		}
		Ok(())
	}

	async fn teardown(&mut self) {
		if let Some(mut node) = self.process.take() {
			node.terminate().await;
		}
		self.client = None;
	}

	/// Fails with [`Error::Launch`] once the node launched by this provider has exited. Always
	/// succeeds for a node this provider did not launch.
	pub fn ensure_running(&mut self) -> Result<(), Error> {
		match self.process.as_mut() {
			Some(node) => node.ensure_running(),
			None => Ok(()),
		}
	}

	/// Stops the node launched by this provider. A node that was already running is left alone.
	pub async fn disconnect(&mut self) -> Result<(), Error> {
		self.client = None;
		if matches!(self.state, ProviderState::Ready | ProviderState::Connecting) {
			self.state = ProviderState::Disconnected;
		}
		if let Some(mut node) = self.process.take() {
			node.stop().await?;
		}
		Ok(())
	}

	/// Sends a JSON-RPC request to the node.
	///
	/// # Arguments
	/// * `method` - The JSON-RPC method.
	/// * `params` - The parameters, passed through as is.
	pub async fn send_rpc(&self, method: &str, params: Value) -> Result<Value, Error> {
		match (&self.client, self.state) {
			(Some(client), ProviderState::Ready) => client.request(method, params).await,
			(_, state) => Err(Error::NotConnected { state }),
		}
	}

	pub async fn chain_id(&self) -> Result<u64, Error> {
		let method = methods::ETH_CHAIN_ID;
		parse_quantity(method, &self.send_rpc(method, json!([])).await?)
	}

	pub async fn client_version(&self) -> Result<String, Error> {
		let method = methods::WEB3_CLIENT_VERSION;
		let version = self.send_rpc(method, json!([])).await?;
		version
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| connection::invalid_response(method, &version))
	}

	/// Development networks need no priority fee.
	pub fn priority_fee(&self) -> u64 {
		0
	}

	pub async fn set_block_gas_limit(&self, gas_limit: u64) -> Result<bool, Error> {
		let result =
			self.send_rpc(methods::EVM_SET_BLOCK_GAS_LIMIT, json!([format!("{gas_limit:#x}")])).await?;
		Ok(result == Value::Bool(true))
	}

	/// Replaces the code at `address`.
	///
	/// # Arguments
	/// * `address` - The account address.
	/// * `code` - Hex-encoded bytecode, with or without `0x`.
	pub async fn set_code(&self, address: &str, code: &str) -> Result<bool, Error> {
		check_address(address)?;
		let digits = code.strip_prefix("0x").unwrap_or(code);
		if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(Error::InvalidArgument(format!("Value {code} is not convertible to hex")));
		}
		let params = json!([address, format!("0x{digits}")]);
		let result = self.send_rpc(methods::HARDHAT_SET_CODE, params).await?;
		Ok(result == Value::Bool(true))
	}

	/// Sets the timestamp of the next block.
	pub async fn set_timestamp(&self, timestamp: u64) -> Result<(), Error> {
		self.send_rpc(methods::EVM_SET_NEXT_BLOCK_TIMESTAMP, json!([timestamp])).await?;
		Ok(())
	}

	/// Mines `blocks` blocks at once.
	pub async fn mine(&self, blocks: u64) -> Result<(), Error> {
		// Hardhat rejects quantities with leading zeros.
		self.send_rpc(methods::HARDHAT_MINE, json!([format!("{blocks:#x}")])).await?;
		Ok(())
	}

	/// Snapshots the chain state and returns the snapshot id.
	pub async fn snapshot(&self) -> Result<String, Error> {
		let method = methods::EVM_SNAPSHOT;
		let id = self.send_rpc(method, json!([])).await?;
		id.as_str().map(str::to_string).ok_or_else(|| connection::invalid_response(method, &id))
	}

	/// Restores a snapshot taken with [`HardhatProvider::snapshot`].
	pub async fn revert(&self, snapshot_id: &str) -> Result<bool, Error> {
		Ok(self.send_rpc(methods::EVM_REVERT, json!([snapshot_id])).await? == Value::Bool(true))
	}

	/// Lets transactions be sent from `address` without its key.
	pub async fn unlock_account(&self, address: &str) -> Result<bool, Error> {
		check_address(address)?;
		Ok(self.send_rpc(methods::HARDHAT_IMPERSONATE_ACCOUNT, json!([address])).await? ==
			Value::Bool(true))
	}

	/// Sets the balance of `address`, see [`parse_amount`] for accepted amounts.
	pub async fn set_balance(&self, address: &str, amount: &str) -> Result<(), Error> {
		check_address(address)?;
		let wei = parse_amount(amount)?;
		self.send_rpc(methods::HARDHAT_SET_BALANCE, json!([address, format!("{wei:#x}")])).await?;
		Ok(())
	}

	/// The struct logs of a mined transaction.
	pub async fn get_transaction_trace(&self, tx_hash: &str) -> Result<Vec<TraceFrame>, Error> {
		let trace = self.send_rpc(methods::DEBUG_TRACE_TRANSACTION, json!([tx_hash])).await?;
		let trace: Trace = serde_json::from_value(trace)?;
		Ok(trace.struct_logs)
	}

	/// Re-forks the upstream network, discarding local changes.
	///
	/// # Arguments
	/// * `block_number` - Block to fork from, defaulting to the configured one.
	pub async fn reset_fork(&self, block_number: Option<u64>) -> Result<Value, Error> {
		let Some(fork) = &self.fork else {
			return match self.target {
				Target::Local => Err(Error::InvalidArgument(
					"`reset_fork` is only available for forked networks".into(),
				)),
				Target::Fork { .. } => Err(Error::NotConnected { state: self.state }),
			};
		};
		self.send_rpc(methods::HARDHAT_RESET, fork.reset_params(block_number)).await
	}
}

fn check_address(address: &str) -> Result<(), Error> {
	let valid = address
		.strip_prefix("0x")
		.is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()));
	if valid { Ok(()) } else { Err(Error::InvalidArgument(format!("Invalid address `{address}`"))) }
}

/// Parses an amount of ether into wei.
///
/// Accepts plain integers (`1000`), hex quantities (`0x3e8`) and amounts with a unit such as
/// `50 ETH`, `1.5 ether`, `20 gwei` or `7 wei`.
pub fn parse_amount(amount: &str) -> Result<u128, Error> {
	let invalid = || Error::InvalidArgument(format!("Invalid amount `{amount}`"));
	let amount_str = amount.trim();
	if let Some(hex) = amount_str.strip_prefix("0x") {
		return u128::from_str_radix(hex, 16).map_err(|_| invalid());
	}
	let (value, decimals) = match amount_str.split_once(char::is_whitespace) {
		None => (amount_str, 0),
		Some((value, unit)) => {
			let decimals = match unit.trim().to_lowercase().as_str() {
				"eth" | "ether" => 18,
				"gwei" => 9,
				"wei" => 0,
				_ => return Err(invalid()),
			};
			(value, decimals)
		},
	};
	let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
	if (whole.is_empty() && fraction.is_empty()) || fraction.len() > decimals {
		return Err(invalid());
	}
	let digits = format!("{whole}{fraction:0<decimals$}");
	if !digits.chars().all(|c| c.is_ascii_digit()) {
		return Err(invalid());
	}
	digits.parse().map_err(|_| invalid())
}
