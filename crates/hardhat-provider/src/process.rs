// SPDX-License-Identifier: GPL-3.0

//! Locating, launching and stopping the `hardhat node` child process.

use crate::{
	Error,
	fork::{BlockPin, ForkSpec},
	strings::node::{HARDHAT_BIN, NODE_LOG_TARGET, NODE_MODULES_BIN, flags},
};
use hardhat_common::{PortReservation, expand_home, find_executable, probe};
use std::{
	ffi::{OsStr, OsString},
	path::{Path, PathBuf},
	process::{ExitStatus, Stdio},
	time::Duration,
};
use tokio::{
	io::{AsyncBufReadExt, AsyncRead, BufReader},
	process::{Child, Command},
	task::JoinHandle,
	time::timeout,
};

/// Time given to the node to shut down after an interrupt before it is killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);
/// Interface the node binds to.
const HOSTNAME: &str = "127.0.0.1";

fn binary_name() -> String {
	if cfg!(windows) { format!("{HARDHAT_BIN}.cmd") } else { HARDHAT_BIN.to_string() }
}

/// Finds the Hardhat executable.
///
/// The configured path wins. Otherwise the project's `node_modules` is searched, followed by the
/// one in the home directory.
///
/// # Arguments
/// * `bin_path` - The `bin_path` setting.
/// * `project_dir` - The project root.
pub fn locate_binary(bin_path: Option<&Path>, project_dir: &Path) -> Result<PathBuf, Error> {
	if let Some(path) = bin_path {
		let path = expand_home(path);
		if !path.is_file() {
			return Err(Error::Launch(format!(
				"Unable to find Hardhat binary at '{}'. Is it installed?",
				path.display()
			)));
		}
		return Ok(path);
	}

	let relative = Path::new(NODE_MODULES_BIN).join(binary_name());
	let candidates = [
		Some(project_dir.join(&relative)),
		dirs::home_dir().map(|home| home.join(&relative)),
	];
	if let Some(path) = candidates.into_iter().flatten().find(|path| path.is_file()) {
		return Ok(path);
	}

	if find_executable("npx").is_none() {
		return Err(Error::Launch(
			"Could not locate `npx`. Install Node.js and NPM to run a Hardhat node.".into(),
		));
	}
	Err(Error::NotInstalled)
}

/// Whether the project has the Hardhat NPM package installed, according to `npm list`.
///
/// Runs on the blocking thread pool. Returns `None` when NPM itself is not available.
///
/// # Arguments
/// * `project_dir` - The project root.
pub async fn hardhat_installed(project_dir: &Path) -> Option<bool> {
	let project_dir = project_dir.to_path_buf();
	match tokio::task::spawn_blocking(move || npm_lists_hardhat(&project_dir)).await {
		Ok(installed) => installed,
		Err(e) => {
			log::debug!("`npm list` did not complete: {e}");
			None
		},
	}
}

fn npm_lists_hardhat(project_dir: &Path) -> Option<bool> {
	let npm = find_executable("npm")?;
	let args = [
		OsStr::new("list"),
		OsStr::new(HARDHAT_BIN),
		OsStr::new("--depth"),
		OsStr::new("0"),
		OsStr::new("--prefix"),
		project_dir.as_os_str(),
	];
	match probe(&npm, args) {
		Ok(output) => Some(output.contains(&format!("{HARDHAT_BIN}@"))),
		Err(e) => {
			log::debug!("{e}");
			Some(false)
		},
	}
}

/// The version reported by a Hardhat executable.
///
/// # Arguments
/// * `binary` - The Hardhat executable.
pub fn hardhat_version(binary: &Path) -> Result<semver::Version, Error> {
	let output = probe(binary, ["--version"])?;
	semver::Version::parse(&output)
		.map_err(|e| Error::Launch(format!("Unrecognized Hardhat version `{output}`: {e}")))
}

/// Arguments for `hardhat node`.
///
/// # Arguments
/// * `port` - The port the node listens on.
/// * `config_file` - The Hardhat config file.
/// * `fork` - The upstream network to fork, if any.
/// * `no_deploy` - Whether to skip `hardhat-deploy` scripts. Only used when forking.
pub fn build_args(
	port: u16,
	config_file: &Path,
	fork: Option<&ForkSpec>,
	no_deploy: bool,
) -> Vec<OsString> {
	let mut args: Vec<OsString> = vec![
		"node".into(),
		flags::HOSTNAME.into(),
		HOSTNAME.into(),
		flags::PORT.into(),
		port.to_string().into(),
		flags::CONFIG.into(),
		config_file.into(),
	];
	if let Some(fork) = fork {
		args.push(flags::FORK.into());
		args.push(fork.upstream_url.as_str().into());
		if no_deploy {
			args.push(flags::NO_DEPLOY.into());
		}
		if let BlockPin::Number(number) = fork.block {
			args.push(flags::FORK_BLOCK_NUMBER.into());
			args.push(number.to_string().into());
		}
	}
	args
}

/// A running `hardhat node` child process.
///
/// The child is killed when this is dropped, so prefer [`NodeProcess::stop`] for a graceful
/// shutdown.
#[derive(Debug)]
pub struct NodeProcess {
	child: Child,
	port: u16,
	// Keeps the port out of other reservations while the node owns it.
	_reservation: Option<PortReservation>,
	output: Vec<JoinHandle<()>>,
}

impl NodeProcess {
	/// Spawns the node and forwards its output to the log.
	///
	/// # Arguments
	/// * `binary` - The Hardhat executable.
	/// * `args` - Arguments, see [`build_args`].
	/// * `port` - The port the node was told to listen on.
	/// * `reservation` - The reservation holding `port`, released just before spawning.
	pub fn spawn(
		binary: &Path,
		args: &[OsString],
		port: u16,
		reservation: Option<PortReservation>,
	) -> Result<Self, Error> {
		let mut command = Command::new(binary);
		command
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		terminate_with_parent(&mut command);

		let mut reservation = reservation;
		if let Some(reservation) = reservation.as_mut() {
			reservation.release();
		}
		log::debug!(
			"Running `{} {}`",
			binary.display(),
			args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
		);
		let mut child = command.spawn().map_err(|e| {
			Error::Launch(format!("Failed to start '{}': {e}", binary.display()))
		})?;

		let mut output = Vec::with_capacity(2);
		if let Some(stdout) = child.stdout.take() {
			output.push(forward_output(stdout, log::Level::Debug));
		}
		if let Some(stderr) = child.stderr.take() {
			output.push(forward_output(stderr, log::Level::Warn));
		}
		Ok(Self { child, port, _reservation: reservation, output })
	}

	/// The process id, or `None` once the process has been reaped.
	pub fn id(&self) -> Option<u32> {
		self.child.id()
	}

	/// The port the node listens on.
	pub fn port(&self) -> u16 {
		self.port
	}

	/// The exit status if the process has exited.
	pub fn has_exited(&mut self) -> Result<Option<ExitStatus>, Error> {
		Ok(self.child.try_wait()?)
	}

	/// Fails with [`Error::Launch`] if the process is no longer running.
	pub fn ensure_running(&mut self) -> Result<(), Error> {
		match self.has_exited()? {
			Some(status) => Err(Error::Launch(format!(
				"Hardhat node exited unexpectedly ({status}). Check the `{NODE_LOG_TARGET}` logs for its output."
			))),
			None => Ok(()),
		}
	}

	/// Interrupts the node and waits for it to exit, killing it if it takes too long.
	pub async fn stop(&mut self) -> Result<(), Error> {
		let Some(pid) = self.child.id() else {
			return Ok(());
		};
		log::info!("Stopping Hardhat node (pid {pid}).");
		interrupt(pid);
		match timeout(STOP_TIMEOUT, self.child.wait()).await {
			Ok(status) => log::debug!("Hardhat node exited with {}", status?),
			Err(_) => {
				log::warn!(
					"Hardhat node did not exit within {} seconds, killing it.",
					STOP_TIMEOUT.as_secs()
				);
				self.child.kill().await?;
			},
		}
		Ok(())
	}

	/// Kills the node immediately and reaps it.
	pub async fn terminate(&mut self) {
		if self.child.id().is_none() {
			return;
		}
		if let Err(e) = self.child.kill().await {
			log::error!("Failed to kill Hardhat node: {e}");
		}
	}
}

impl Drop for NodeProcess {
	fn drop(&mut self) {
		for task in &self.output {
			task.abort();
		}
	}
}

/// Makes the child receive `SIGTERM` when this process dies.
#[cfg(target_os = "linux")]
fn terminate_with_parent(command: &mut Command) {
	// SAFETY: `prctl` is async-signal-safe and touches no memory of the parent.
	unsafe {
		command.pre_exec(|| {
			if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
				return Err(std::io::Error::last_os_error());
			}
			Ok(())
		});
	}
}

#[cfg(not(target_os = "linux"))]
fn terminate_with_parent(_command: &mut Command) {}

fn forward_output<R>(stream: R, level: log::Level) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut lines = BufReader::new(stream).lines();
		while let Ok(Some(line)) = lines.next_line().await {
			log::log!(target: NODE_LOG_TARGET, level, "{line}");
		}
	})
}

#[cfg(unix)]
fn interrupt(pid: u32) {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return;
	};
	// SAFETY: Sending a signal has no memory safety requirements.
	if unsafe { libc::kill(pid, libc::SIGINT) } == -1 {
		log::debug!("Failed to interrupt process {pid}: {}", std::io::Error::last_os_error());
	}
}

#[cfg(windows)]
fn interrupt(pid: u32) {
	let pid = pid.to_string();
	if let Err(e) = probe(Path::new("taskkill"), ["/F", "/T", "/PID", pid.as_str()]) {
		log::debug!("{e}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::Ecosystem;
	use std::fs;
	use tempfile::TempDir;
	use url::Url;

	fn fork_spec(block: BlockPin) -> anyhow::Result<ForkSpec> {
		Ok(ForkSpec {
			ecosystem: Ecosystem::Ethereum,
			network: "mainnet".into(),
			upstream_provider: "infura".into(),
			upstream_url: Url::parse("https://mainnet.example.com/v3/key")?,
			block,
			enable_deployments: false,
		})
	}

	fn strings(args: Vec<OsString>) -> Vec<String> {
		args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
	}

	#[test]
	fn build_args_for_local_node() {
		let args = build_args(8555, Path::new("/data/hardhat/hardhat.config.js"), None, true);
		assert_eq!(
			strings(args),
			vec![
				"node",
				"--hostname",
				"127.0.0.1",
				"--port",
				"8555",
				"--config",
				"/data/hardhat/hardhat.config.js"
			]
		);
	}

	#[test]
	fn build_args_for_pinned_fork() -> anyhow::Result<()> {
		let fork = fork_spec(BlockPin::Number(17_000_000))?;
		let args = strings(build_args(8545, Path::new("hardhat.config.js"), Some(&fork), true));
		assert_eq!(
			&args[7..],
			[
				"--fork",
				"https://mainnet.example.com/v3/key",
				"--no-deploy",
				"--fork-block-number",
				"17000000"
			]
		);
		Ok(())
	}

	#[test]
	fn build_args_for_latest_fork() -> anyhow::Result<()> {
		let fork = fork_spec(BlockPin::Latest)?;
		let args = strings(build_args(8545, Path::new("hardhat.config.js"), Some(&fork), false));
		assert_eq!(&args[7..], ["--fork", "https://mainnet.example.com/v3/key"]);
		Ok(())
	}

	#[test]
	fn locate_binary_prefers_configured_path() -> anyhow::Result<()> {
		let dir = TempDir::new()?;
		let bin = dir.path().join("my-hardhat");
		fs::write(&bin, "")?;
		assert_eq!(locate_binary(Some(&bin), dir.path())?, bin);
		Ok(())
	}

	#[test]
	fn locate_binary_fails_for_missing_configured_path() -> anyhow::Result<()> {
		let dir = TempDir::new()?;
		let result = locate_binary(Some(&dir.path().join("missing")), dir.path());
		assert!(matches!(result, Err(Error::Launch(message)) if message.contains("missing")));
		Ok(())
	}

	#[test]
	fn locate_binary_finds_project_installation() -> anyhow::Result<()> {
		let dir = TempDir::new()?;
		let bin_dir = dir.path().join(NODE_MODULES_BIN);
		fs::create_dir_all(&bin_dir)?;
		fs::write(bin_dir.join(binary_name()), "")?;
		assert_eq!(locate_binary(None, dir.path())?, bin_dir.join(binary_name()));
		Ok(())
	}

	#[cfg(unix)]
	#[test]
	fn locate_binary_without_installation() -> anyhow::Result<()> {
		use hardhat_common::command_mock::CommandMock;

		let project = TempDir::new()?;
		let home = TempDir::new()?;
		CommandMock::default().with_command("npx", 0).execute_sync(|| {
			temp_env::with_var("HOME", Some(home.path()), || {
				assert!(matches!(locate_binary(None, project.path()), Err(Error::NotInstalled)));
			});
		});
		Ok(())
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn hardhat_installed_reads_npm_list() -> anyhow::Result<()> {
		use hardhat_common::command_mock::CommandMock;

		let project = TempDir::new()?;
		let project_dir = project.path().to_path_buf();
		CommandMock::default()
			.with_command_script("npm", "#!/bin/sh\necho 'project@1.0.0'\necho '└── hardhat@2.22.2'")
			.execute(|| async move {
				assert_eq!(hardhat_installed(&project_dir).await, Some(true));
			})
			.await;

		let project_dir = project.path().to_path_buf();
		CommandMock::default()
			.with_command_script("npm", "#!/bin/sh\necho 'project@1.0.0'\nexit 1")
			.execute(|| async move {
				assert_eq!(hardhat_installed(&project_dir).await, Some(false));
			})
			.await;
		Ok(())
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn hardhat_version_works() -> anyhow::Result<()> {
		use hardhat_common::command_mock::CommandMock;

		let mock = CommandMock::default().with_command_script("hardhat", "#!/bin/sh\necho 2.22.2");
		let binary = mock.command_path("hardhat");
		mock.execute(|| async move {
			assert_eq!(hardhat_version(&binary).unwrap(), semver::Version::new(2, 22, 2));
		})
		.await;
		Ok(())
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn stop_interrupts_node() -> anyhow::Result<()> {
		use hardhat_common::command_mock::CommandMock;

		let mock = CommandMock::default().with_long_running_command("hardhat");
		let binary = mock.command_path("hardhat");
		let mut node = NodeProcess::spawn(&binary, &[], 8545, None)?;
		assert!(node.id().is_some());
		node.ensure_running()?;
		node.stop().await?;
		assert!(node.id().is_none());
		assert!(matches!(node.ensure_running(), Err(Error::Launch(..))));
		Ok(())
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn ensure_running_detects_early_exit() -> anyhow::Result<()> {
		use hardhat_common::command_mock::CommandMock;

		let mock = CommandMock::default().with_command_script("hardhat", "#!/bin/sh\nexit 3");
		let binary = mock.command_path("hardhat");
		let mut node = NodeProcess::spawn(&binary, &[], 8545, None)?;
		for _ in 0..50 {
			if node.has_exited()?.is_some() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		assert!(matches!(node.ensure_running(), Err(Error::Launch(..))));
		Ok(())
	}
}
