// SPDX-License-Identifier: GPL-3.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
	#[error("Failed to execute `{command}`: {message}")]
	Command { command: String, message: String },
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("Unable to find an available port. Ports tried: {0}")]
	PortUnavailable(String),
}
