// SPDX-License-Identifier: GPL-3.0

//! String constants for the RPC client and provider helpers.

/// JSON-RPC method names sent to the node.
pub mod methods {
	pub const DEBUG_TRACE_TRANSACTION: &str = "debug_traceTransaction";
	pub const ETH_CHAIN_ID: &str = "eth_chainId";
	pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
	pub const EVM_REVERT: &str = "evm_revert";
	pub const EVM_SET_BLOCK_GAS_LIMIT: &str = "evm_setBlockGasLimit";
	pub const EVM_SET_NEXT_BLOCK_TIMESTAMP: &str = "evm_setNextBlockTimestamp";
	pub const EVM_SNAPSHOT: &str = "evm_snapshot";
	pub const HARDHAT_IMPERSONATE_ACCOUNT: &str = "hardhat_impersonateAccount";
	pub const HARDHAT_MINE: &str = "hardhat_mine";
	pub const HARDHAT_RESET: &str = "hardhat_reset";
	pub const HARDHAT_SET_BALANCE: &str = "hardhat_setBalance";
	pub const HARDHAT_SET_CODE: &str = "hardhat_setCode";
	pub const WEB3_CLIENT_VERSION: &str = "web3_clientVersion";
}

/// The JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";
