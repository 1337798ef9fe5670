// SPDX-License-Identifier: GPL-3.0

//! Error messages reported by the Hardhat node when a transaction fails.

pub const EXECUTION_REVERTED_PREFIX: &str = "execution reverted: ";
pub const NO_REASON_REVERT: &str = "Transaction reverted without a reason string";
pub const OUT_OF_GAS: &str = "Transaction ran out of gas";
pub const PANIC_CODE_PREFIX: &str =
	"Error: VM Exception while processing transaction: reverted with panic code ";
pub const RETURN_DATA_MARKER: &str = "(return data:";
pub const REVERT_REASON_PREFIX: &str =
	"Error: VM Exception while processing transaction: reverted with reason string ";
pub const UNRECOGNIZED_CUSTOM_ERROR: &str = "reverted with an unrecognized custom error";
