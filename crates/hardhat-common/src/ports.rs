// SPDX-License-Identifier: GPL-3.0

//! Ephemeral port reservation for locally launched nodes.
//!
//! A port is obtained by binding `127.0.0.1:0`, so the operating system hands out a port no other
//! socket currently holds. The listener is kept open until the node is about to bind the port
//! itself, and every port handed out is recorded in a process-wide set until its reservation is
//! dropped, so two reservations alive at the same time never share a port.

use crate::Error;
use std::{
	collections::HashSet,
	net::{Ipv4Addr, TcpListener},
	sync::{LazyLock, Mutex},
};

/// Number of times the operating system is asked for a port before giving up.
const MAX_ATTEMPTS: usize = 25;

static RESERVED: LazyLock<Mutex<HashSet<u16>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// A port on the loopback interface held for a single node.
#[derive(Debug)]
pub struct PortReservation {
	port: u16,
	listener: Option<TcpListener>,
}

impl PortReservation {
	/// Reserves a free port on `127.0.0.1`.
	pub fn reserve() -> Result<Self, Error> {
		let mut attempted = Vec::new();
		for _ in 0..MAX_ATTEMPTS {
			let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
			let port = listener.local_addr()?.port();
			if reserved().insert(port) {
				log::debug!("Reserved port {port}.");
				return Ok(Self { port, listener: Some(listener) });
			}
			attempted.push(port.to_string());
		}
		Err(Error::PortUnavailable(attempted.join(", ")))
	}

	/// The reserved port.
	pub fn port(&self) -> u16 {
		self.port
	}

	/// Whether the socket holding the port is still open.
	pub fn is_held(&self) -> bool {
		self.listener.is_some()
	}

	/// Closes the socket so that a child process can bind the port. The port stays recorded as
	/// in use until the reservation is dropped.
	pub fn release(&mut self) {
		if self.listener.take().is_some() {
			log::debug!("Released port {} for binding.", self.port);
		}
	}
}

impl Drop for PortReservation {
	fn drop(&mut self) {
		self.listener.take();
		reserved().remove(&self.port);
	}
}

fn reserved() -> std::sync::MutexGuard<'static, HashSet<u16>> {
	RESERVED.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::{net::TcpStream, thread};

	#[test]
	fn reserve_holds_port() -> Result<(), Error> {
		let reservation = PortReservation::reserve()?;
		assert!(reservation.is_held());
		assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, reservation.port())).is_err());
		Ok(())
	}

	#[test]
	fn release_frees_socket_but_keeps_record() -> Result<(), Error> {
		let mut reservation = PortReservation::reserve()?;
		let port = reservation.port();
		reservation.release();
		assert!(!reservation.is_held());
		assert!(reserved().contains(&port));
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
		assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_ok());
		drop(listener);
		drop(reservation);
		assert!(!reserved().contains(&port));
		Ok(())
	}

	#[test]
	fn concurrent_reservations_are_unique() {
		let handles: Vec<_> = (0..16)
			.map(|_| {
				thread::spawn(|| {
					let mut reservation = PortReservation::reserve().unwrap();
					// Released sockets must not make the port available to other reservations.
					reservation.release();
					reservation
				})
			})
			.collect();
		let reservations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
		let ports: HashSet<_> = reservations.iter().map(PortReservation::port).collect();
		assert_eq!(ports.len(), reservations.len());
	}
}
