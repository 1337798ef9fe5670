// SPDX-License-Identifier: GPL-3.0

//! The `hardhat.config.js` file passed to the node with `--config`.
//!
//! Unless the user points at their own file, one is generated in the data directory. It seeds the
//! node with the test accounts the host tool derives from its mnemonic and sets a zero base fee so
//! transactions can use a gas price of zero.

use crate::{Error, config::TestAccounts};
use std::{
	fs,
	path::{Path, PathBuf},
};

/// File name of the generated config.
pub const DEFAULT_FILE_NAME: &str = "hardhat.config.js";
/// File names Hardhat accepts.
pub const FILE_NAME_OPTIONS: [&str; 2] = [DEFAULT_FILE_NAME, "hardhat.config.ts"];
/// Derivation path of the test accounts.
pub const HD_PATH: &str = "m/44'/60'/0'";

/// Renders the content of the generated config file.
///
/// # Arguments
/// * `accounts` - The test accounts to seed the node with.
/// * `hard_fork` - The hard fork the node runs.
pub fn render(accounts: &TestAccounts, hard_fork: &str) -> String {
	format!(
		r#"// See https://hardhat.org/config/ for config options.
module.exports = {{
  hardfork: "{hard_fork}",
  networks: {{
    hardhat: {{
      // Base fee of 0 allows use of 0 gas price when testing
      initialBaseFeePerGas: 0,
      accounts: {{
        mnemonic: "{mnemonic}",
        path: "{HD_PATH}",
        count: {count}
      }}
    }},
  }},
}};
"#,
		mnemonic = accounts.mnemonic,
		count = accounts.number_of_accounts,
	)
}

/// The config file location: the user's file (or `hardhat.config.js` in the user's directory)
/// if configured, otherwise `<data_dir>/hardhat/hardhat.config.js`.
///
/// # Arguments
/// * `configured` - The `hardhat_config_file` setting.
/// * `data_dir` - The provider's data directory.
pub fn resolve_path(configured: Option<&Path>, data_dir: &Path) -> PathBuf {
	match configured {
		Some(path) if path.is_dir() => path.join(DEFAULT_FILE_NAME),
		Some(path) => path.to_path_buf(),
		None => data_dir.join("hardhat").join(DEFAULT_FILE_NAME),
	}
}

/// Makes sure a usable config file exists at `path` and returns its absolute location.
///
/// A missing file is created with the default content. An existing file is kept, but a warning is
/// logged when it does not declare the expected accounts.
///
/// # Arguments
/// * `path` - Location of the config file, see [`resolve_path`].
/// * `accounts` - The test accounts the node must be seeded with.
/// * `hard_fork` - The hard fork used for a generated file.
pub fn ensure(path: &Path, accounts: &TestAccounts, hard_fork: &str) -> Result<PathBuf, Error> {
	let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
	if !FILE_NAME_OPTIONS.contains(&name) {
		return Err(Error::Config(format!(
			"Expecting file name to be one of '{}'. Received '{name}'.",
			FILE_NAME_OPTIONS.join(", ")
		)));
	}
	let path = std::path::absolute(path)?;
	let content = render(accounts, hard_fork);
	if !path.is_file() {
		log::debug!("Creating file '{}'.", path.display());
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(&path, content)?;
		return Ok(path);
	}

	match fs::read_to_string(&path) {
		Ok(existing) if !declares_accounts(&existing, accounts) => log::warn!(
			"Existing '{}' conflicts with the expected test accounts. Some features may not work as intended. The default config looks like this:\n{content}",
			path.display()
		),
		Ok(_) => {},
		Err(e) => log::error!(
			"Failed to read Hardhat config file '{}': {e}. Some features may not work as intended.",
			path.display()
		),
	}
	Ok(path)
}

// The config may be JavaScript or TypeScript, so only its literals are checked.
fn declares_accounts(content: &str, accounts: &TestAccounts) -> bool {
	content.contains(&accounts.mnemonic) &&
		content.contains(HD_PATH) &&
		declares_count(content, accounts.number_of_accounts)
}

fn declares_count(content: &str, count: u32) -> bool {
	let needle = format!("count: {count}");
	content.match_indices(&needle).any(|(at, _)| {
		!content[at + needle.len()..].starts_with(|c: char| c.is_ascii_digit())
	})
}
