// SPDX-License-Identifier: GPL-3.0

use anyhow::Result;
use hardhat_provider::{registry::PROVIDER_NAME, supported_networks};

/// Prints every `<ecosystem>:<network>:hardhat` selector, one per line.
pub(crate) fn execute() -> Result<()> {
	for (ecosystem, network) in supported_networks() {
		println!("{ecosystem}:{network}:{PROVIDER_NAME}");
	}
	Ok(())
}
