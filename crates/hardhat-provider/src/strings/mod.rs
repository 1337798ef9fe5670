// SPDX-License-Identifier: GPL-3.0

//! Centralized string constants for the hardhat-provider crate.

pub mod node;
pub mod rpc;
pub mod vm;
