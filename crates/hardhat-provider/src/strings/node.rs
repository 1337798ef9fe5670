// SPDX-License-Identifier: GPL-3.0

//! String constants used when launching the Hardhat node.

/// Name of the Hardhat executable installed by NPM.
pub const HARDHAT_BIN: &str = "hardhat";

/// Location of NPM-installed executables relative to a package root.
pub const NODE_MODULES_BIN: &str = "node_modules/.bin";

/// Marker expected in the `web3_clientVersion` of a Hardhat node.
pub const CLIENT_VERSION_MARKER: &str = "hardhat";

/// Log target for output forwarded from the node process.
pub const NODE_LOG_TARGET: &str = "hardhat::node";

/// Command line flags understood by `hardhat node`.
pub mod flags {
	pub const CONFIG: &str = "--config";
	pub const FORK: &str = "--fork";
	pub const FORK_BLOCK_NUMBER: &str = "--fork-block-number";
	pub const HOSTNAME: &str = "--hostname";
	pub const NO_DEPLOY: &str = "--no-deploy";
	pub const PORT: &str = "--port";
}

/// Plugin which adds deployment scripts to `hardhat node`.
pub const HARDHAT_DEPLOY_PLUGIN: &str = "hardhat-deploy";
