// SPDX-License-Identifier: GPL-3.0

//! Provider for Hardhat development nodes.
//!
//! This crate resolves where a Hardhat node should run, launches `hardhat node` as a managed child
//! process when none is running, waits until it accepts JSON-RPC and forwards requests to it. A
//! node can serve a fresh local chain or fork an upstream network from an archive provider.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        HardhatProvider                           │
//! │      connect / disconnect / send_rpc / mine / snapshot / ...     │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                 │                  │                │
//!        ▼                 ▼                  ▼                ▼
//! ┌─────────────┐  ┌──────────────┐  ┌────────────────┐  ┌────────────┐
//! │ConfigLoader │  │ fork::resolve│  │  NodeProcess   │  │ RpcClient  │
//! │ (defaults,  │  │ (upstream    │  │ (hardhat node, │  │ (readiness │
//! │ project,    │  │  registry,   │  │  port, logs,   │  │  polling,  │
//! │ overrides)  │  │  block pin)  │  │  stop)         │  │  requests) │
//! └─────────────┘  └──────────────┘  └────────────────┘  └────────────┘
//! ```

pub mod config;
pub mod connection;
mod errors;
pub mod fork;
pub mod hardhat_config;
mod package;
pub mod process;
mod provider;
pub mod registry;
mod strings;
pub mod vm_error;

pub use config::{ConfigLoader, Host, PortSetting, ProviderConfig, ProviderSettings};
pub use connection::RpcClient;
pub use errors::Error;
pub use fork::{BlockPin, ForkSpec, RpcUpstream, UpstreamProvider, UpstreamRegistry};
pub use provider::{HardhatProvider, ProviderState, TraceFrame, parse_amount};
pub use registry::{Ecosystem, NetworkKind, NetworkSelector, supported_networks};
pub use vm_error::VirtualMachineError;

/// Chain id of a Hardhat development network.
pub const HARDHAT_CHAIN_ID: u64 = 31337;
