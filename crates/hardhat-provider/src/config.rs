// SPDX-License-Identifier: GPL-3.0

//! Layered provider configuration.
//!
//! Settings are merged from built-in defaults, the `[hardhat]` and `[test]` tables of the project
//! configuration file and finally [`ProviderSettings`] overrides given by the host tool (e.g. from
//! its command line). The result is a validated [`ProviderConfig`].

use crate::Error;
use hardhat_common::{expand_home, is_local_host};
use serde::Deserialize;
use std::{
	collections::HashMap,
	fmt, fs,
	path::{Path, PathBuf},
	time::Duration,
};
use url::Url;

/// Port Hardhat listens on by default.
pub const DEFAULT_PORT: u16 = 8545;
/// Host that makes the provider pick a free local port.
pub const AUTO_HOST: &str = "auto";
/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "hardhat-provider.toml";
/// Mnemonic of the test accounts the host tool expects.
pub const DEFAULT_MNEMONIC: &str = "test test test test test test test test test test test junk";
/// Number of test accounts the host tool expects.
pub const DEFAULT_NUMBER_OF_ACCOUNTS: u32 = 10;
/// Hard fork configured in the generated Hardhat config file.
pub const DEFAULT_HARD_FORK: &str = "shanghai";

const DEFAULT_REQUEST_TIMEOUT: u64 = 30;
const DEFAULT_FORK_REQUEST_TIMEOUT: u64 = 300;
const DEFAULT_PROCESS_ATTEMPTS: u32 = 5;
const LOCALHOST: &str = "127.0.0.1";

/// The deprecated `port` setting: either a fixed port or `"auto"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPort")]
pub enum PortSetting {
	Fixed(u16),
	Auto,
}

impl Default for PortSetting {
	fn default() -> Self {
		PortSetting::Fixed(DEFAULT_PORT)
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
	Number(u16),
	Keyword(String),
}

impl TryFrom<RawPort> for PortSetting {
	type Error = String;

	fn try_from(raw: RawPort) -> Result<Self, Self::Error> {
		match raw {
			RawPort::Number(port) => Ok(PortSetting::Fixed(port)),
			RawPort::Keyword(keyword) if keyword == AUTO_HOST => Ok(PortSetting::Auto),
			RawPort::Keyword(other) => Err(format!("expected a port number or \"auto\", got \"{other}\"")),
		}
	}
}

impl std::str::FromStr for PortSetting {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s == AUTO_HOST {
			return Ok(PortSetting::Auto);
		}
		s.parse()
			.map(PortSetting::Fixed)
			.map_err(|_| Error::Config(format!("Invalid port `{s}`: expected a number or \"auto\".")))
	}
}

/// Fork settings for a single upstream network, `[hardhat.fork.<ecosystem>.<network>]`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForkConfig {
	/// Name of the upstream provider used as the archive node. `None` uses the network default.
	pub upstream_provider: Option<String>,
	/// Block to fork from. `None` forks from the latest block.
	pub block_number: Option<u64>,
	/// Host of the forked node, overriding `hardhat.host` for this network.
	pub host: Option<String>,
	/// Whether `hardhat-deploy` scripts run when the forked node starts.
	pub enable_hardhat_deployments: bool,
}

/// The `[hardhat]` table of the project configuration file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
	/// Deprecated, use `host`.
	pub port: PortSetting,
	/// The host address or `"auto"` to use localhost with a free port.
	pub host: Option<String>,
	/// Start a node when none is running on a local host.
	pub manage_process: bool,
	/// Seconds to wait for a local node.
	pub request_timeout: u64,
	/// Seconds to wait for a forked node.
	pub fork_request_timeout: u64,
	/// Number of start attempts on fresh ports when the host is `"auto"`. Each attempt may use
	/// the full request timeout.
	pub process_attempts: u32,
	/// The Hardhat executable. Looked up in `node_modules` when unset.
	pub bin_path: Option<PathBuf>,
	/// A Hardhat config file (or directory containing one) used instead of the generated one.
	pub hardhat_config_file: Option<PathBuf>,
	/// Hard fork of the generated Hardhat config file.
	pub hard_fork: String,
	/// Fork settings by ecosystem and network name.
	pub fork: HashMap<String, HashMap<String, ForkConfig>>,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			port: PortSetting::default(),
			host: None,
			manage_process: true,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			fork_request_timeout: DEFAULT_FORK_REQUEST_TIMEOUT,
			process_attempts: DEFAULT_PROCESS_ATTEMPTS,
			bin_path: None,
			hardhat_config_file: None,
			hard_fork: DEFAULT_HARD_FORK.to_string(),
			fork: HashMap::new(),
		}
	}
}

/// The `[test]` table: accounts the node must be seeded with.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestAccounts {
	pub mnemonic: String,
	pub number_of_accounts: u32,
}

impl Default for TestAccounts {
	fn default() -> Self {
		Self { mnemonic: DEFAULT_MNEMONIC.to_string(), number_of_accounts: DEFAULT_NUMBER_OF_ACCOUNTS }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectFile {
	hardhat: NetworkConfig,
	test: TestAccounts,
}

/// Overrides supplied by the host tool, taking precedence over the project file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderSettings {
	pub host: Option<String>,
	/// Deprecated, use `host`.
	pub port: Option<PortSetting>,
}

/// Where the node is reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Host {
	/// Localhost with a port reserved at connect time.
	Auto,
	/// A fixed endpoint.
	Uri(Url),
}

impl Host {
	/// Whether the node runs on this machine and can therefore be managed.
	pub fn is_local(&self) -> bool {
		match self {
			Host::Auto => true,
			Host::Uri(url) => url.host_str().is_some_and(is_local_host),
		}
	}
}

impl fmt::Display for Host {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Host::Auto => f.write_str(AUTO_HOST),
			Host::Uri(url) => f.write_str(url.as_str().trim_end_matches('/')),
		}
	}
}

/// Fully resolved provider configuration.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
	/// The host used for local (non-fork) networks.
	pub host: Host,
	pub manage_process: bool,
	pub request_timeout: Duration,
	pub fork_request_timeout: Duration,
	/// Start attempts with an `auto` host. A timed out attempt is retried, so `connect` can take
	/// up to this many request timeouts.
	pub process_attempts: u32,
	pub bin_path: Option<PathBuf>,
	pub hardhat_config_file: Option<PathBuf>,
	pub hard_fork: String,
	pub fork: HashMap<String, HashMap<String, ForkConfig>>,
	pub accounts: TestAccounts,
	/// Root of the project; `node_modules` and `package.json` are looked up here.
	pub project_dir: PathBuf,
	/// Directory for generated files, such as the default Hardhat config file.
	pub data_dir: PathBuf,
}

impl ProviderConfig {
	/// Fork settings for an upstream network, or defaults when none are configured.
	///
	/// # Arguments
	/// * `ecosystem` - The ecosystem name, e.g. `ethereum`.
	/// * `network` - The upstream network name, e.g. `mainnet`.
	pub fn fork_config(&self, ecosystem: &str, network: &str) -> ForkConfig {
		self.fork
			.get(ecosystem)
			.and_then(|networks| networks.get(network))
			.cloned()
			.unwrap_or_default()
	}

	/// The host of a forked node: the fork's own `host` if configured, otherwise the provider host.
	pub fn fork_host(&self, fork: &ForkConfig) -> Result<Host, Error> {
		match &fork.host {
			Some(host) => resolve_host(host),
			None => Ok(self.host.clone()),
		}
	}
}

/// Builds a [`ProviderConfig`] from defaults, a project file and overrides.
#[derive(Debug)]
pub struct ConfigLoader {
	project_dir: PathBuf,
	config_file: Option<PathBuf>,
	data_dir: Option<PathBuf>,
	settings: ProviderSettings,
}

impl ConfigLoader {
	/// Creates a loader for the project at `project_dir`, reading `hardhat-provider.toml` from it.
	pub fn new(project_dir: impl Into<PathBuf>) -> Self {
		Self {
			project_dir: project_dir.into(),
			config_file: None,
			data_dir: None,
			settings: ProviderSettings::default(),
		}
	}

	/// Reads configuration from `path` instead of the project's default file.
	pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config_file = Some(path.into());
		self
	}

	/// Stores generated files in `dir` instead of the user's data directory.
	pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.data_dir = Some(dir.into());
		self
	}

	/// Applies overrides from the host tool.
	pub fn settings(mut self, settings: ProviderSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Loads, merges and validates the configuration.
	pub fn load(self) -> Result<ProviderConfig, Error> {
		let explicit = self.config_file.is_some();
		let path = self.config_file.unwrap_or_else(|| self.project_dir.join(CONFIG_FILE_NAME));
		let project = read_project_file(&path, explicit)?;
		let data_dir = match self.data_dir {
			Some(dir) => dir,
			None => default_data_dir()?,
		};
		resolve(project, self.settings, self.project_dir, data_dir)
	}
}

fn read_project_file(path: &Path, required: bool) -> Result<ProjectFile, Error> {
	if !path.is_file() {
		if required {
			return Err(Error::Config(format!("Config file `{}` does not exist.", path.display())));
		}
		log::debug!("No project config at `{}`, using defaults.", path.display());
		return Ok(ProjectFile::default());
	}
	let content = fs::read_to_string(path)?;
	toml::from_str(&content)
		.map_err(|e| Error::Config(format!("Invalid config file `{}`: {e}", path.display())))
}

fn default_data_dir() -> Result<PathBuf, Error> {
	dirs::data_dir()
		.map(|dir| dir.join("hardhat-provider"))
		.ok_or_else(|| Error::Config("the data directory could not be determined".into()))
}

fn resolve(
	project: ProjectFile,
	settings: ProviderSettings,
	project_dir: PathBuf,
	data_dir: PathBuf,
) -> Result<ProviderConfig, Error> {
	let ProjectFile { hardhat, test } = project;
	validate(&hardhat, &test)?;
	let host = resolve_provider_host(&hardhat, &settings)?;
	for (ecosystem, networks) in &hardhat.fork {
		for (network, fork) in networks {
			if let Some(fork_host) = &fork.host {
				resolve_host(fork_host).map_err(|e| {
					Error::Config(format!("Invalid fork host for {ecosystem}:{network}: {e}"))
				})?;
			}
		}
	}
	Ok(ProviderConfig {
		host,
		manage_process: hardhat.manage_process,
		request_timeout: Duration::from_secs(hardhat.request_timeout),
		fork_request_timeout: Duration::from_secs(hardhat.fork_request_timeout),
		process_attempts: hardhat.process_attempts,
		bin_path: hardhat.bin_path.as_deref().map(expand_home),
		hardhat_config_file: hardhat.hardhat_config_file.as_deref().map(expand_home),
		hard_fork: hardhat.hard_fork,
		fork: hardhat.fork,
		accounts: test,
		project_dir,
		data_dir,
	})
}

fn validate(hardhat: &NetworkConfig, test: &TestAccounts) -> Result<(), Error> {
	if hardhat.request_timeout == 0 {
		return Err(Error::Config("`request_timeout` must be positive.".into()));
	}
	if hardhat.fork_request_timeout == 0 {
		return Err(Error::Config("`fork_request_timeout` must be positive.".into()));
	}
	if hardhat.process_attempts == 0 {
		return Err(Error::Config("`process_attempts` must be positive.".into()));
	}
	if test.number_of_accounts == 0 {
		return Err(Error::Config("`number_of_accounts` must be positive.".into()));
	}
	Ok(())
}

fn resolve_provider_host(
	hardhat: &NetworkConfig,
	settings: &ProviderSettings,
) -> Result<Host, Error> {
	const DEPRECATED: &str = "`port` setting is deprecated. Please use `host` key that includes the port.";

	if let Some(port) = settings.port {
		log::warn!("{DEPRECATED}");
		return host_from_port(port);
	}
	if let Some(host) = &settings.host {
		return resolve_host(host);
	}
	let legacy_port = hardhat.port != PortSetting::default();
	match (&hardhat.host, legacy_port) {
		(Some(_), true) => Err(Error::Config(
			"Cannot use deprecated `port` field with `host`. Place `port` at end of `host` instead."
				.into(),
		)),
		(None, true) => {
			log::warn!("{DEPRECATED}");
			host_from_port(hardhat.port)
		},
		(Some(host), false) => resolve_host(host),
		(None, false) => host_from_port(PortSetting::default()),
	}
}

fn host_from_port(port: PortSetting) -> Result<Host, Error> {
	match port {
		PortSetting::Auto => Ok(Host::Auto),
		PortSetting::Fixed(port) => Ok(Host::Uri(local_url(port)?)),
	}
}

/// The URL of a node listening on the loopback interface.
pub fn local_url(port: u16) -> Result<Url, Error> {
	Ok(Url::parse(&format!("http://{LOCALHOST}:{port}"))?)
}

/// Resolves a configured host into a [`Host`].
///
/// Hosts without a scheme get `http://` when local and `https://` otherwise; local hosts without a
/// port get the default Hardhat port.
///
/// # Arguments
/// * `host` - The configured host, e.g. `auto`, `127.0.0.1:8555` or `https://rpc.example.com`.
pub fn resolve_host(host: &str) -> Result<Host, Error> {
	let host = host.trim();
	if host == AUTO_HOST {
		return Ok(Host::Auto);
	}
	if host.is_empty() {
		return Err(Error::Config("`host` must not be empty.".into()));
	}
	let uri = if host.starts_with("http") {
		host.to_string()
	} else if is_local_host(host) {
		format!("http://{host}")
	} else {
		format!("https://{host}")
	};
	let mut url = Url::parse(&uri)
		.map_err(|e| Error::Config(format!("Invalid host `{host}`: {e}")))?;
	if url.host_str().is_some_and(is_local_host) && url.port().is_none() {
		url.set_port(Some(DEFAULT_PORT))
			.map_err(|_| Error::Config(format!("Invalid host `{host}`.")))?;
	}
	if url.host_str() == Some("localhost") {
		url.set_host(Some(LOCALHOST))?;
	}
	Ok(Host::Uri(url))
}
