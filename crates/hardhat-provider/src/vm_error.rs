// SPDX-License-Identifier: GPL-3.0

//! Classification of transaction failures reported by the Hardhat node.

use crate::strings::vm::*;
use thiserror::Error;

/// A failure of the virtual machine while executing a transaction or call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VirtualMachineError {
	/// The contract reverted, optionally with a reason, panic code or custom error data.
	#[error("Contract logic error: {}", .revert_message.as_deref().unwrap_or("Transaction failed."))]
	ContractLogic { revert_message: Option<String> },
	/// The transaction ran out of gas.
	#[error("The transaction ran out of gas")]
	OutOfGas,
	/// Any other failure.
	#[error("Virtual machine error: {0}")]
	Other(String),
}

impl VirtualMachineError {
	/// Classifies an error message returned by the node.
	///
	/// # Arguments
	/// * `message` - The `message` field of a JSON-RPC error.
	pub fn from_message(message: &str) -> Self {
		let message = message.strip_prefix(EXECUTION_REVERTED_PREFIX).unwrap_or(message);

		if let Some(panic) = message.strip_prefix(PANIC_CODE_PREFIX) {
			return Self::revert(panic.trim());
		}
		if let Some(reason) = message.strip_prefix(REVERT_REASON_PREFIX) {
			return Self::revert(reason.trim_matches('\''));
		}
		if message.contains(NO_REASON_REVERT) {
			return Self::ContractLogic { revert_message: None };
		}
		if message == OUT_OF_GAS {
			return Self::OutOfGas;
		}
		if message.contains(UNRECOGNIZED_CUSTOM_ERROR) && message.contains(RETURN_DATA_MARKER) {
			// Custom errors surface only as their raw return data.
			let data = message.rsplit(RETURN_DATA_MARKER).next().unwrap_or_default();
			return Self::revert(data.trim_end_matches(['/', ')']).trim());
		}
		Self::Other(message.to_string())
	}

	fn revert(message: &str) -> Self {
		Self::ContractLogic { revert_message: Some(message.to_string()) }
	}
}
