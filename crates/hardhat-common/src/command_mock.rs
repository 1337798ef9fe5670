// SPDX-License-Identifier: GPL-3.0

//! Fake executables for tests.
//!
//! Scripts are written into a temporary directory that can be prepended to (or replace) `PATH`
//! for the duration of a test, or referenced directly through [`CommandMock::fake_path`].

use std::{
	os::unix::fs::PermissionsExt,
	path::{Path, PathBuf},
};
use tempfile::TempDir;

fn exit_script(exit_code: i32) -> String {
	format!("#!/bin/sh\nexit {exit_code}")
}

/// A script which records its process id in `pid_file` and then runs until killed.
fn long_running_script(pid_file: &Path) -> String {
	format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 300", pid_file.display())
}

pub struct CommandMock {
	temp_dir: TempDir,
}

impl Default for CommandMock {
	fn default() -> Self {
		Self { temp_dir: tempfile::tempdir().unwrap() }
	}
}

impl CommandMock {
	pub fn fake_path(&self) -> &Path {
		self.temp_dir.path()
	}

	/// The path of a fake command created by this mock.
	pub fn command_path(&self, command_name: &str) -> PathBuf {
		self.temp_dir.path().join(command_name)
	}

	/// Create a fake command that exits with the given code
	pub fn with_command(self, command_name: &str, exit_code: i32) -> Self {
		self.with_command_script(command_name, &exit_script(exit_code))
	}

	/// Create a fake command with custom script content
	pub fn with_command_script(self, command_name: &str, script: &str) -> Self {
		let fake_command_path = self.command_path(command_name);
		std::fs::write(&fake_command_path, script).unwrap();
		Self::set_executable(&fake_command_path).unwrap();
		self
	}

	/// Create a fake command that never exits on its own. Its process id is written to
	/// `<command_name>.pid` next to the script, see [`CommandMock::recorded_pid`].
	pub fn with_long_running_command(self, command_name: &str) -> Self {
		let pid_file = self.command_path(&format!("{command_name}.pid"));
		let script = long_running_script(&pid_file);
		self.with_command_script(command_name, &script)
	}

	/// Create a fake command without execute permissions
	pub fn with_non_permissioned_command(self, command_name: &str) -> Self {
		let fake_command_path = self.command_path(command_name);
		std::fs::write(&fake_command_path, exit_script(0)).unwrap();
		self
	}

	/// The process id recorded by a command created with
	/// [`CommandMock::with_long_running_command`], if it has started.
	pub fn recorded_pid(&self, command_name: &str) -> Option<u32> {
		let pid_file = self.command_path(&format!("{command_name}.pid"));
		std::fs::read_to_string(pid_file).ok()?.trim().parse().ok()
	}

	/// Execute the test with mocked commands prepended to PATH
	pub async fn execute<F, Fut, R>(self, test: F) -> R
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = R>,
	{
		let new_path = self.prepended_path();
		temp_env::async_with_vars([("PATH", Some(new_path))], test()).await
	}

	/// Execute a synchronous test with mocked commands prepended to PATH
	pub fn execute_sync<F, R>(self, test: F) -> R
	where
		F: FnOnce() -> R,
	{
		let new_path = self.prepended_path();
		temp_env::with_var("PATH", Some(new_path), test)
	}

	/// Execute the test with ONLY mocked commands in PATH
	pub async fn execute_isolated<F, Fut, R>(self, test: F) -> R
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = R>,
	{
		temp_env::async_with_vars([("PATH", Some(self.temp_dir.path()))], test()).await
	}

	/// Execute a synchronous test with ONLY mocked commands in PATH
	pub fn execute_isolated_sync<F, R>(self, test: F) -> R
	where
		F: FnOnce() -> R,
	{
		temp_env::with_var("PATH", Some(self.temp_dir.path()), test)
	}

	fn prepended_path(&self) -> std::ffi::OsString {
		let path = std::env::var_os("PATH").unwrap_or_default();
		let mut paths = vec![self.temp_dir.path().to_path_buf()];
		paths.extend(std::env::split_paths(&path));
		std::env::join_paths(paths).unwrap()
	}

	fn set_executable(path: &Path) -> std::io::Result<()> {
		let permissions = std::fs::Permissions::from_mode(0o755);
		std::fs::set_permissions(path, permissions)
	}
}
