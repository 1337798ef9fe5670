// SPDX-License-Identifier: GPL-3.0

use anyhow::{Result, anyhow};
use clap::Args;
use hardhat_provider::{
	HardhatProvider, NetworkKind, NetworkSelector, PortSetting, RpcUpstream, UpstreamRegistry,
	process,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use url::Url;

/// How often a launched node is checked for an unexpected exit.
const NODE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug)]
pub(crate) struct UpArgs {
	/// The network to serve, as `<ecosystem>:<network>[:hardhat]`.
	#[arg(short, long, default_value = "ethereum:local:hardhat")]
	pub(crate) network: NetworkSelector,
	/// Provider configuration file [default: <project>/hardhat-provider.toml].
	#[arg(short, long)]
	pub(crate) config: Option<PathBuf>,
	/// Address of the node, or `auto` to pick a free local port.
	#[arg(long)]
	pub(crate) host: Option<String>,
	/// Deprecated, use `--host`.
	#[arg(long, conflicts_with = "host")]
	pub(crate) port: Option<PortSetting>,
	/// Directory of the project.
	#[arg(short, long, default_value = ".")]
	pub(crate) project: PathBuf,
	/// Directory for generated files.
	#[arg(long)]
	pub(crate) data_dir: Option<PathBuf>,
	/// Upstream provider of a forked network, as `<name>=<url>`. The first one is the default.
	#[arg(long = "upstream", value_parser = parse_upstream)]
	pub(crate) upstreams: Vec<(String, Url)>,
}

fn parse_upstream(value: &str) -> Result<(String, Url), String> {
	let (name, url) = value
		.split_once('=')
		.ok_or_else(|| format!("expected `<name>=<url>`, got `{value}`"))?;
	let url = Url::parse(url).map_err(|e| format!("invalid url `{url}`: {e}"))?;
	Ok((name.to_string(), url))
}

impl UpArgs {
	/// Connects to the selected network and waits for Ctrl+C.
	pub(crate) async fn execute(self) -> Result<()> {
		let config =
			super::load_config(self.project, self.config, self.data_dir, self.host, self.port)?;
		let binary = process::locate_binary(config.bin_path.as_deref(), &config.project_dir);
		if let Ok(binary) = binary {
			match process::hardhat_version(&binary) {
				Ok(version) => log::info!("Using Hardhat {version} at '{}'.", binary.display()),
				Err(e) => log::debug!("{e}"),
			}
		}

		let mut registry = UpstreamRegistry::new();
		if let NetworkKind::Fork { upstream } = &self.network.kind {
			for (name, url) in self.upstreams {
				let provider = Arc::new(RpcUpstream::new(name, url));
				registry.register(self.network.ecosystem, upstream, provider);
			}
		} else if !self.upstreams.is_empty() {
			log::warn!("Ignoring upstream providers for the non-forked network {}.", self.network);
		}
		let mut provider =
			HardhatProvider::from_selector(config, &self.network, Arc::new(registry))?;

		let cancel = CancellationToken::new();
		let interrupt = cancel.clone();
		let ctrl_c = tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				interrupt.cancel();
			}
		});
		provider.connect_with_cancel(&cancel).await?;

		let uri = provider.uri().ok_or_else(|| anyhow!("connected provider has no uri"))?;
		match provider.process_id() {
			Some(pid) => println!("Hardhat node for {} running at {uri} (pid {pid}).", self.network),
			None => println!("Connected to the Hardhat node for {} at {uri}.", self.network),
		}
		println!("Press Ctrl+C to stop.");
		let exited = until_stopped(&mut provider, &cancel).await;
		ctrl_c.abort();
		println!("Shutting down...");
		provider.disconnect().await?;
		Ok(exited?)
	}
}

/// Waits for `cancel`, failing early if the launched node exits.
async fn until_stopped(
	provider: &mut HardhatProvider,
	cancel: &CancellationToken,
) -> Result<(), hardhat_provider::Error> {
	let mut check = tokio::time::interval(NODE_CHECK_INTERVAL);
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Ok(()),
			_ = check.tick() => provider.ensure_running()?,
		}
	}
}
