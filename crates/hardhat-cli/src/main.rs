// SPDX-License-Identifier: GPL-3.0

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
#[command(subcommand_required = true)]
enum Commands {
	/// Start (or connect to) a Hardhat node and keep it running until Ctrl+C.
	#[clap(alias = "u")]
	Up(commands::up::UpArgs),
	/// Send a JSON-RPC request to a running node.
	#[clap(alias = "r")]
	Rpc(commands::rpc::RpcArgs),
	/// List the networks a Hardhat node can serve.
	#[clap(alias = "n")]
	Networks,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let cli = Cli::parse();
	match cli.command {
		Commands::Up(args) => args.execute().await,
		Commands::Rpc(args) => args.execute().await,
		Commands::Networks => commands::networks::execute(),
	}
}

#[test]
fn verify_cli() {
	// https://docs.rs/clap/latest/clap/_derive/_tutorial/chapter_4/index.html
	use clap::CommandFactory;
	Cli::command().debug_assert()
}
