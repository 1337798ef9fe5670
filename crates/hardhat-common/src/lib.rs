// SPDX-License-Identifier: GPL-3.0

#[cfg(all(unix, any(test, feature = "test-utils")))]
pub mod command_mock;
pub mod errors;
pub mod executable;
pub mod helpers;
pub mod ports;

pub use errors::Error;
pub use executable::{find_executable, probe};
pub use helpers::{expand_home, is_local_host};
pub use ports::PortReservation;
