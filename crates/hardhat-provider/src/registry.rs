// SPDX-License-Identifier: GPL-3.0

//! The ecosystems and networks a Hardhat node can serve.
//!
//! Every ecosystem has a `local` network and, for each of its public networks, a `<network>-fork`
//! network which forks that network from an upstream provider.

use crate::Error;
use std::{fmt, str::FromStr};
use strum::VariantArray;
use strum_macros::{AsRefStr, Display, EnumString, VariantArray};

/// Name of the network served by a plain local node.
pub const LOCAL_NETWORK: &str = "local";
/// Suffix of networks that fork an upstream network.
pub const FORK_SUFFIX: &str = "-fork";
/// Name of this provider in network selectors.
pub const PROVIDER_NAME: &str = "hardhat";

/// An EVM ecosystem.
#[derive(
	AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd, VariantArray,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Ecosystem {
	Arbitrum,
	Avalanche,
	Base,
	Bsc,
	Ethereum,
	Fantom,
	Gnosis,
	Optimism,
	Polygon,
}

impl Ecosystem {
	/// The upstream networks which can be forked.
	pub fn fork_networks(&self) -> &'static [&'static str] {
		use Ecosystem::*;
		match self {
			Arbitrum => &["mainnet", "sepolia"],
			Avalanche => &["mainnet", "fuji"],
			Base => &["mainnet", "sepolia"],
			Bsc => &["mainnet", "testnet"],
			Ethereum => &["mainnet", "sepolia", "holesky"],
			Fantom => &["opera", "testnet"],
			Gnosis => &["mainnet", "chaido"],
			Optimism => &["mainnet", "sepolia"],
			Polygon => &["mainnet", "mumbai", "amoy"],
		}
	}

	/// Whether `network` is an upstream network of this ecosystem.
	pub fn can_fork(&self, network: &str) -> bool {
		self.fork_networks().contains(&network)
	}
}

/// What a Hardhat node does for a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkKind {
	/// A fresh development chain.
	Local,
	/// A fork of the named upstream network.
	Fork { upstream: String },
}

impl NetworkKind {
	/// Classifies a network name of `ecosystem`, e.g. `local` or `mainnet-fork`.
	pub fn parse(ecosystem: Ecosystem, network: &str) -> Result<Self, Error> {
		if network == LOCAL_NETWORK {
			return Ok(NetworkKind::Local);
		}
		match network.strip_suffix(FORK_SUFFIX) {
			Some(upstream) if ecosystem.can_fork(upstream) =>
				Ok(NetworkKind::Fork { upstream: upstream.to_string() }),
			_ => Err(Error::Config(format!(
				"Network `{network}` is not supported by Hardhat in ecosystem `{ecosystem}`."
			))),
		}
	}
}

/// All `(ecosystem, network)` pairs this provider serves.
pub fn supported_networks() -> Vec<(Ecosystem, String)> {
	Ecosystem::VARIANTS
		.iter()
		.flat_map(|ecosystem| {
			std::iter::once(LOCAL_NETWORK.to_string())
				.chain(ecosystem.fork_networks().iter().map(|n| format!("{n}{FORK_SUFFIX}")))
				.map(move |network| (*ecosystem, network))
		})
		.collect()
}

/// A network choice in the form `<ecosystem>:<network>[:hardhat]`, e.g. `ethereum:mainnet-fork`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkSelector {
	pub ecosystem: Ecosystem,
	pub network: String,
	pub kind: NetworkKind,
}

impl FromStr for NetworkSelector {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parts: Vec<&str> = s.split(':').collect();
		let (ecosystem, network) = match parts.as_slice() {
			[ecosystem, network] => (*ecosystem, *network),
			[ecosystem, network, provider] if provider.eq_ignore_ascii_case(PROVIDER_NAME) =>
				(*ecosystem, *network),
			[_, _, provider] =>
				return Err(Error::Config(format!("Unsupported provider `{provider}` in `{s}`."))),
			_ =>
				return Err(Error::Config(format!(
					"Invalid network `{s}`. Expected `<ecosystem>:<network>[:{PROVIDER_NAME}]`."
				))),
		};
		let ecosystem = Ecosystem::from_str(ecosystem)
			.map_err(|_| Error::Config(format!("Unknown ecosystem `{ecosystem}`.")))?;
		let network = network.to_lowercase();
		let kind = NetworkKind::parse(ecosystem, &network)?;
		Ok(Self { ecosystem, network, kind })
	}
}

impl fmt::Display for NetworkSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{PROVIDER_NAME}", self.ecosystem, self.network)
	}
}
