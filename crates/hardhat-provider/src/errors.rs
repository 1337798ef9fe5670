// SPDX-License-Identifier: GPL-3.0

use crate::{ProviderState, vm_error::VirtualMachineError};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
	#[error("Connecting to the Hardhat node was cancelled")]
	Cancelled,
	#[error("Common error: {0}")]
	CommonError(#[from] hardhat_common::Error),
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Failed to connect to {uri}: {message}")]
	Connection { uri: String, message: String },
	#[error("Hardhat node at {uri} did not become ready within {} seconds", .timeout.as_secs_f32())]
	ConnectionTimeout { uri: String, timeout: Duration },
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Invalid response for RPC request `{method}`: {message}")]
	InvalidResponse { method: String, message: String },
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	JsonError(#[from] serde_json::Error),
	#[error("Failed to launch the Hardhat node: {0}")]
	Launch(String),
	#[error("Provider is not connected (state: {state})")]
	NotConnected { state: ProviderState },
	#[error("A process that is not a Hardhat node is running at host {uri}")]
	NotHardhatNode { uri: String },
	#[error(
		"Missing local Hardhat NPM package. Install Hardhat in your project (`npm install --save-dev hardhat`); a global installation will not work."
	)]
	NotInstalled,
	#[error("Invalid URL: {0}")]
	ParseError(#[from] url::ParseError),
	#[error("Provider failed to connect and cannot be reused. Create a new provider instead.")]
	ProviderFailed,
	#[error("RPC request `{method}` failed ({code}): {message}")]
	Rpc { method: String, code: i64, message: String, data: Option<Value> },
	#[error("Upstream provider `{provider}` for network `{network}` is unavailable: {reason}")]
	UpstreamUnavailable { provider: String, network: String, reason: String },
}

impl Error {
	/// Interprets an RPC error returned while executing a transaction or call.
	///
	/// Returns `None` for errors that were not reported by the node.
	pub fn virtual_machine_error(&self) -> Option<VirtualMachineError> {
		match self {
			Error::Rpc { message, .. } => Some(VirtualMachineError::from_message(message)),
			_ => None,
		}
	}
}
