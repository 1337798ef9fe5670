// SPDX-License-Identifier: GPL-3.0

use std::{
	env,
	path::{Path, PathBuf},
};

/// Expands a leading `~` in a path to the home directory of the current user.
///
/// # Arguments
/// * `path` - The path to expand.
pub fn expand_home(path: &Path) -> PathBuf {
	let Ok(stripped) = path.strip_prefix("~") else {
		return path.to_path_buf();
	};
	match env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
		Some(home) => PathBuf::from(home).join(stripped),
		None => path.to_path_buf(),
	}
}

/// Whether a host string (optionally including scheme and port) refers to the local machine.
///
/// # Arguments
/// * `host` - The host or URI to check.
pub fn is_local_host(host: &str) -> bool {
	host.contains("127.0.0.1") || host.contains("localhost")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expand_home_works() {
		temp_env::with_var("HOME", Some("/home/tester"), || {
			assert_eq!(
				expand_home(Path::new("~/project/hardhat.config.js")),
				PathBuf::from("/home/tester/project/hardhat.config.js")
			);
			assert_eq!(expand_home(Path::new("~")), PathBuf::from("/home/tester"));
		});
	}

	#[test]
	fn expand_home_ignores_other_paths() {
		assert_eq!(expand_home(Path::new("/tmp/~")), PathBuf::from("/tmp/~"));
		assert_eq!(expand_home(Path::new("relative/path")), PathBuf::from("relative/path"));
	}

	#[test]
	fn is_local_host_works() {
		assert!(is_local_host("http://127.0.0.1:8545"));
		assert!(is_local_host("localhost:8555"));
		assert!(!is_local_host("https://eth-mainnet.example.com"));
		assert!(!is_local_host("auto"));
	}
}
