// SPDX-License-Identifier: GPL-3.0

//! A fake `hardhat` executable and a minimal JSON-RPC node that answers once it has started.

#![allow(dead_code)]

use hardhat_common::command_mock::CommandMock;
use hardhat_provider::{ConfigLoader, ProviderConfig};
use serde_json::{Value, json};
use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};
use tempfile::TempDir;
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::{TcpListener, TcpStream},
	task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const HARDHAT_VERSION: &str = "HardhatNetwork/2.22.2/@nomicfoundation/edr/0.3.5";
pub const GENESIS_HASH: &str =
	"0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3";

/// A fake `hardhat` script. It records its arguments, its process id and how often it ran in
/// files next to itself.
pub struct FakeHardhat {
	mock: CommandMock,
}

impl FakeHardhat {
	/// A node that keeps running until it is stopped.
	pub fn long_running() -> Self {
		Self::with_tail("exec sleep 300")
	}

	/// A node that prints an error and exits immediately.
	pub fn exiting() -> Self {
		Self::with_tail("echo 'Error HH8: There is one or more errors in your config file' >&2\nexit 1")
	}

	fn with_tail(tail: &str) -> Self {
		let mock = CommandMock::default();
		let dir = mock.fake_path().to_path_buf();
		let script = format!(
			"#!/bin/sh\necho run >> '{runs}'\necho \"$@\" > '{args}'\necho $$ > '{pid}'\n{tail}\n",
			runs = dir.join("hardhat.runs").display(),
			args = dir.join("hardhat.args").display(),
			pid = dir.join("hardhat.pid").display(),
		);
		Self { mock: mock.with_command_script("hardhat", &script) }
	}

	pub fn bin_path(&self) -> PathBuf {
		self.mock.command_path("hardhat")
	}

	fn file(&self, name: &str) -> PathBuf {
		self.mock.fake_path().join(name)
	}

	/// Process id of the last run, if it started.
	pub fn pid(&self) -> Option<u32> {
		self.mock.recorded_pid("hardhat")
	}

	/// Arguments of the last run.
	pub fn args(&self) -> Vec<String> {
		fs::read_to_string(self.file("hardhat.args"))
			.map(|args| args.split_whitespace().map(str::to_string).collect())
			.unwrap_or_default()
	}

	/// Number of times the script was started.
	pub fn runs(&self) -> usize {
		fs::read_to_string(self.file("hardhat.runs")).map(|r| r.lines().count()).unwrap_or(0)
	}

	/// Serves JSON-RPC on the port of the next run as soon as the script starts.
	pub fn serve_when_started(&self) -> Responder {
		let args = self.file("hardhat.args");
		Responder(tokio::spawn(async move {
			let port = loop {
				if let Some(port) = fs::read_to_string(&args).ok().as_deref().and_then(port_arg) {
					break port;
				}
				tokio::time::sleep(Duration::from_millis(20)).await;
			};
			let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await else {
				return;
			};
			while let Ok((stream, _)) = listener.accept().await {
				tokio::spawn(serve_connection(stream));
			}
		}))
	}
}

/// An upstream node that stops answering at a given method. `stalled` fires once a request for
/// it arrives.
pub struct StallingUpstream {
	pub url: Url,
	pub stalled: CancellationToken,
	_server: Responder,
}

impl StallingUpstream {
	/// Answers like a mainnet node until asked for `method`, which never gets a response.
	pub async fn stalling_at(method: &'static str) -> anyhow::Result<Self> {
		let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
		let url = Url::parse(&format!("http://{}", listener.local_addr()?))?;
		let stalled = CancellationToken::new();
		let notify = stalled.clone();
		let server = tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				tokio::spawn(stall_connection(stream, method, notify.clone()));
			}
		});
		Ok(Self { url, stalled, _server: Responder(server) })
	}
}

async fn stall_connection(
	mut stream: TcpStream,
	method: &'static str,
	stalled: CancellationToken,
) -> std::io::Result<()> {
	let mut buffer = Vec::new();
	let mut chunk = [0u8; 4096];
	loop {
		while let Some((body, consumed)) = next_request(&buffer) {
			buffer.drain(..consumed);
			let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
			if request.get("method").and_then(Value::as_str) == Some(method) {
				stalled.cancel();
				std::future::pending::<()>().await;
			}
			let mut payload = respond(&request);
			if request.get("method").and_then(Value::as_str) == Some("eth_chainId") {
				payload["result"] = json!("0x1");
			}
			write_response(&mut stream, &payload).await?;
		}
		let read = stream.read(&mut chunk).await?;
		if read == 0 {
			return Ok(());
		}
		buffer.extend_from_slice(&chunk[..read]);
	}
}

/// Stops serving when dropped.
pub struct Responder(JoinHandle<()>);

impl Drop for Responder {
	fn drop(&mut self) {
		self.0.abort();
	}
}

fn port_arg(args: &str) -> Option<u16> {
	let mut args = args.split_whitespace();
	args.by_ref().find(|arg| *arg == "--port")?;
	args.next()?.parse().ok()
}

/// Whether a process with `pid` exists.
pub fn is_running(pid: u32) -> bool {
	std::process::Command::new("kill")
		.args(["-0", &pid.to_string()])
		.stderr(std::process::Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

/// A project with the given `hardhat-provider.toml` content.
pub fn project(toml: &str) -> anyhow::Result<(TempDir, ProviderConfig)> {
	let dir = TempDir::new()?;
	fs::write(dir.path().join("hardhat-provider.toml"), toml)?;
	let config = ConfigLoader::new(dir.path()).data_dir(dir.path().join("data")).load()?;
	Ok((dir, config))
}

pub fn toml_path(path: &Path) -> String {
	format!("{:?}", path.display().to_string())
}

fn respond(request: &Value) -> Value {
	let id = request.get("id").cloned().unwrap_or(Value::Null);
	let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
	let result = match method {
		"web3_clientVersion" => json!(HARDHAT_VERSION),
		"eth_chainId" => json!("0x7a69"),
		"eth_getBlockByNumber" => json!({ "number": "0x0", "hash": GENESIS_HASH }),
		"hardhat_reset" | "hardhat_mine" => json!(true),
		_ =>
			return json!({
				"jsonrpc": "2.0",
				"id": id,
				"error": { "code": -32601, "message": format!("Method {method} is not supported") }
			}),
	};
	json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

async fn serve_connection(mut stream: TcpStream) -> std::io::Result<()> {
	let mut buffer = Vec::new();
	let mut chunk = [0u8; 4096];
	loop {
		while let Some((body, consumed)) = next_request(&buffer) {
			buffer.drain(..consumed);
			let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
			write_response(&mut stream, &respond(&request)).await?;
		}
		let read = stream.read(&mut chunk).await?;
		if read == 0 {
			return Ok(());
		}
		buffer.extend_from_slice(&chunk[..read]);
	}
}

async fn write_response(stream: &mut TcpStream, payload: &Value) -> std::io::Result<()> {
	let payload = payload.to_string();
	let response = format!(
		"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{payload}",
		payload.len()
	);
	stream.write_all(response.as_bytes()).await
}

fn next_request(buffer: &[u8]) -> Option<(Vec<u8>, usize)> {
	let head_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
	let head = String::from_utf8_lossy(&buffer[..head_end]);
	let length = head
		.lines()
		.filter_map(|line| line.split_once(':'))
		.find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
		.and_then(|(_, value)| value.trim().parse::<usize>().ok())
		.unwrap_or(0);
	if buffer.len() < head_end + length {
		return None;
	}
	Some((buffer[head_end..head_end + length].to_vec(), head_end + length))
}
