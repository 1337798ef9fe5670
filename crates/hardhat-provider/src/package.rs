// SPDX-License-Identifier: GPL-3.0

//! Hardhat plugins declared in a project's `package.json`.

use crate::Error;
use regex::Regex;
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path, sync::LazyLock};

static PLUGIN_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"hardhat-[A-Za-z0-9-]+$").expect("The regex is valid; qed;"));

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
	#[serde(default)]
	dependencies: BTreeMap<String, String>,
	#[serde(default, rename = "devDependencies")]
	dev_dependencies: BTreeMap<String, String>,
}

/// Names of the Hardhat plugins a project depends on, e.g. `hardhat-deploy`.
///
/// A project without `package.json` has no plugins.
///
/// # Arguments
/// * `project_dir` - The project root.
pub fn hardhat_plugins(project_dir: &Path) -> Result<Vec<String>, Error> {
	let path = project_dir.join("package.json");
	if !path.is_file() {
		return Ok(vec![]);
	}
	let package: PackageJson = serde_json::from_str(&fs::read_to_string(path)?)?;
	Ok(package
		.dependencies
		.into_keys()
		.chain(package.dev_dependencies.into_keys())
		.filter(|name| PLUGIN_PATTERN.is_match(name))
		.collect())
}
