// SPDX-License-Identifier: GPL-3.0

use anyhow::Result;
use hardhat_provider::{ConfigLoader, PortSetting, ProviderConfig, ProviderSettings};
use std::path::PathBuf;

pub(crate) mod networks;
pub(crate) mod rpc;
pub(crate) mod up;

/// Loads the provider configuration of the project at `project`.
pub(crate) fn load_config(
	project: PathBuf,
	config_file: Option<PathBuf>,
	data_dir: Option<PathBuf>,
	host: Option<String>,
	port: Option<PortSetting>,
) -> Result<ProviderConfig> {
	let mut loader = ConfigLoader::new(project).settings(ProviderSettings { host, port });
	if let Some(file) = config_file {
		loader = loader.config_file(file);
	}
	if let Some(dir) = data_dir {
		loader = loader.data_dir(dir);
	}
	Ok(loader.load()?)
}
