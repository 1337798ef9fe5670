// SPDX-License-Identifier: GPL-3.0

use anyhow::{Context, Result};
use clap::Args;
use hardhat_provider::{Ecosystem, HardhatProvider};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct RpcArgs {
	/// The JSON-RPC method, e.g. `eth_blockNumber`.
	pub(crate) method: String,
	/// Parameters as a JSON array.
	#[arg(default_value = "[]")]
	pub(crate) params: String,
	/// Address of the node [default: the project's configured host].
	#[arg(long)]
	pub(crate) host: Option<String>,
	/// Directory of the project.
	#[arg(short, long, default_value = ".")]
	pub(crate) project: PathBuf,
	/// Provider configuration file [default: <project>/hardhat-provider.toml].
	#[arg(short, long)]
	pub(crate) config: Option<PathBuf>,
}

impl RpcArgs {
	/// Sends the request to an already running node and prints the result.
	pub(crate) async fn execute(self) -> Result<()> {
		let params: Value =
			serde_json::from_str(&self.params).context("params must be valid JSON")?;
		let mut config = super::load_config(self.project, self.config, None, self.host, None)?;
		config.manage_process = false;
		let mut provider = HardhatProvider::new(config, Ecosystem::Ethereum);
		provider.connect().await?;
		let result = provider.send_rpc(&self.method, params).await?;
		println!("{}", serde_json::to_string_pretty(&result)?);
		Ok(())
	}
}
