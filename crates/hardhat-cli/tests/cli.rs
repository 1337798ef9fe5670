// SPDX-License-Identifier: GPL-3.0

use assert_cmd::Command;

#[test]
fn networks_lists_local_and_fork_networks() -> anyhow::Result<()> {
	let output = Command::cargo_bin("hardhat-node")?.arg("networks").output()?;
	assert!(output.status.success());
	let stdout = String::from_utf8(output.stdout)?;
	let networks: Vec<&str> = stdout.lines().collect();
	assert!(networks.contains(&"ethereum:local:hardhat"));
	assert!(networks.contains(&"ethereum:mainnet-fork:hardhat"));
	assert!(networks.contains(&"polygon:amoy-fork:hardhat"));
	assert!(networks.iter().all(|n| n.ends_with(":hardhat")));
	Ok(())
}

#[test]
fn up_rejects_unknown_network() -> anyhow::Result<()> {
	Command::cargo_bin("hardhat-node")?
		.args(["up", "--network", "ethereum:goerli-fork:hardhat"])
		.assert()
		.failure();
	Ok(())
}

#[test]
fn rpc_rejects_invalid_params() -> anyhow::Result<()> {
	let project = tempfile::tempdir()?;
	Command::cargo_bin("hardhat-node")?
		.args(["rpc", "eth_blockNumber", "{not json"])
		.arg("--project")
		.arg(project.path())
		.assert()
		.failure();
	Ok(())
}
