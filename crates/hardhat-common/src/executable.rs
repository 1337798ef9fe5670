// SPDX-License-Identifier: GPL-3.0

use crate::Error;
use duct::cmd;
use std::{
	env,
	ffi::OsStr,
	path::{Path, PathBuf},
};

/// Locates an executable by name in the directories listed in `PATH`.
///
/// # Arguments
/// * `name` - The name of the executable, e.g. `npx`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
	let paths = env::var_os("PATH")?;
	env::split_paths(&paths).find_map(|dir| {
		let candidate = dir.join(name);
		if is_executable(&candidate) {
			return Some(candidate);
		}
		if cfg!(windows) {
			let candidate = dir.join(format!("{name}.cmd"));
			if candidate.is_file() {
				return Some(candidate);
			}
		}
		None
	})
}

/// Runs a short-lived command and returns its trimmed standard output.
///
/// Standard error is discarded and a non-zero exit status is reported as an error.
///
/// # Arguments
/// * `program` - The program to run.
/// * `args` - The arguments passed to the program.
pub fn probe<I, S>(program: &Path, args: I) -> Result<String, Error>
where
	I: IntoIterator<Item = S>,
	S: AsRef<OsStr>,
{
	let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
	let command = std::iter::once(program.as_os_str())
		.chain(args.iter().map(|a| a.as_os_str()))
		.map(|a| a.to_string_lossy().into_owned())
		.collect::<Vec<_>>()
		.join(" ");
	let output = cmd(program, &args)
		.stdin_null()
		.stdout_capture()
		.stderr_null()
		.unchecked()
		.run()
		.map_err(|e| Error::Command { command: command.clone(), message: e.to_string() })?;
	if !output.status.success() {
		return Err(Error::Command { command, message: format!("exited with {}", output.status) });
	}
	Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
	use std::os::unix::fs::PermissionsExt;
	path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
	path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use crate::command_mock::CommandMock;

	#[test]
	fn find_executable_works() {
		CommandMock::default().with_command("npx", 0).execute_isolated_sync(|| {
			let found = find_executable("npx").expect("npx should be found");
			assert!(found.ends_with("npx"));
			assert!(find_executable("npm").is_none());
		});
	}

	#[test]
	fn find_executable_skips_non_executable_files() {
		CommandMock::default().with_non_permissioned_command("npx").execute_isolated_sync(|| {
			assert!(find_executable("npx").is_none());
		});
	}

	#[test]
	fn probe_returns_stdout() -> anyhow::Result<()> {
		let mock = CommandMock::default().with_command_script("hardhat", "#!/bin/sh\necho ' 2.22.2 '");
		let output = probe(&mock.fake_path().join("hardhat"), ["--version"])?;
		assert_eq!(output, "2.22.2");
		Ok(())
	}

	#[test]
	fn probe_fails_on_error_status() {
		let mock = CommandMock::default().with_command("npm", 1);
		let result = probe(&mock.fake_path().join("npm"), ["list", "hardhat", "--json"]);
		assert!(matches!(
			result,
			Err(Error::Command { command, .. }) if command.ends_with("npm list hardhat --json")
		));
	}
}
