//! Data phase of a command: one uninterrupted burst of byte exchanges.
//!
//! Every burst is described by a `Transfer`: where outgoing bytes come from,
//! where incoming bytes go, how many positions to exchange, and whether each
//! side advances per byte. Reads send a constant fill byte and writes discard
//! what comes back, so both directions use the same descriptor.
//!
//! Two strategies move the bytes:
//! - `Blocking`: one `Hardware::exchange` per byte
//! - `Offloaded`: two channels of the hardware's `OffloadEngine` (transmit
//!   feed + receive drain), primed together and polled for completion

mod blocking;
mod offload;

use std::fmt;

use crate::hardware::{
	ChannelId,
	Hardware,
};

pub use self::blocking::Blocking;
pub use self::offload::Offloaded;

/// byte sent while only reading
pub const FILL_BYTE: u8 = 0xff;

#[derive(Debug)]
pub enum Source<'a> {
	Memory(&'a [u8]),
	Constant(u8),
}

impl<'a> Source<'a> {
	pub fn byte(&self, position: usize, increment: bool) -> u8 {
		match self {
			Source::Memory(data) => data[if increment { position } else { 0 }],
			Source::Constant(value) => *value,
		}
	}

	fn len(&self) -> Option<usize> {
		match self {
			Source::Memory(data) => Some(data.len()),
			Source::Constant(_) => None,
		}
	}
}

#[derive(Debug)]
pub enum Destination<'a> {
	Memory(&'a mut [u8]),
	Discard,
}

impl<'a> Destination<'a> {
	pub fn store(&mut self, position: usize, increment: bool, byte: u8) {
		match self {
			Destination::Memory(data) => data[if increment { position } else { 0 }] = byte,
			Destination::Discard => (),
		}
	}

	fn len(&self) -> Option<usize> {
		match self {
			Destination::Memory(data) => Some(data.len()),
			Destination::Discard => None,
		}
	}
}

#[derive(Debug)]
pub struct Transfer<'a> {
	pub source: Source<'a>,
	pub destination: Destination<'a>,
	pub count: usize,
	pub source_increment: bool,
	pub destination_increment: bool,
}

impl<'a> Transfer<'a> {
	/// send `data`, drop whatever comes back
	pub fn transmit(data: &'a [u8]) -> Self {
		Transfer {
			source: Source::Memory(data),
			destination: Destination::Discard,
			count: data.len(),
			source_increment: true,
			destination_increment: false,
		}
	}

	/// fill `buffer` with received bytes, sending `FILL_BYTE` for each
	pub fn receive(buffer: &'a mut [u8]) -> Self {
		let count = buffer.len();
		Transfer {
			source: Source::Constant(FILL_BYTE),
			destination: Destination::Memory(buffer),
			count,
			source_increment: false,
			destination_increment: true,
		}
	}

	pub fn exchange(data: &'a [u8], buffer: &'a mut [u8]) -> crate::AResult<Self> {
		ensure!(data.len() == buffer.len(),
			"exchange needs equal lengths (sending {}, receiving {})", data.len(), buffer.len()
		);
		Ok(Transfer {
			source: Source::Memory(data),
			count: data.len(),
			destination: Destination::Memory(buffer),
			source_increment: true,
			destination_increment: true,
		})
	}

	pub fn source_byte(&self, position: usize) -> u8 {
		self.source.byte(position, self.source_increment)
	}

	pub fn store(&mut self, position: usize, byte: u8) {
		self.destination.store(position, self.destination_increment, byte)
	}

	/// check that both memory sides can serve `count` positions
	pub fn validate(&self) -> crate::AResult<()> {
		if 0 == self.count {
			return Ok(());
		}
		if let Some(len) = self.source.len() {
			let needed = if self.source_increment { self.count } else { 1 };
			ensure!(len >= needed, "transfer source too short: {} bytes for {} positions", len, self.count);
		}
		if let Some(len) = self.destination.len() {
			let needed = if self.destination_increment { self.count } else { 1 };
			ensure!(len >= needed, "transfer destination too short: {} bytes for {} positions", len, self.count);
		}
		Ok(())
	}
}

pub trait BurstTransport {
	/// exchange exactly `transfer.count` bytes; the transfer was validated
	/// and has at least one position
	fn burst<H: Hardware + ?Sized>(
		&self,
		hardware: &mut H,
		transfer: &mut Transfer,
		poll_limit: Option<u32>,
	) -> crate::AResult<()>;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Transport {
	Blocking(Blocking),
	Offloaded(Offloaded),
}

impl Transport {
	/// Offloading needs both channels, and they have to differ; anything
	/// else falls back to per-byte exchange.
	pub fn select<H: Hardware + ?Sized>(hardware: &mut H, rx: Option<ChannelId>, tx: Option<ChannelId>) -> Self {
		match (rx, tx) {
			(None, None) => Transport::Blocking(Blocking),
			(Some(rx), Some(tx)) => {
				if rx == tx {
					warn!("Offload channels rx and tx are both {}, using blocking transport", rx);
					Transport::Blocking(Blocking)
				} else if hardware.offload_engine().is_none() {
					warn!("Hardware has no offload engine, using blocking transport");
					Transport::Blocking(Blocking)
				} else {
					Transport::Offloaded(Offloaded { rx, tx })
				}
			},
			(rx, tx) => {
				warn!("Incomplete offload channel pair (rx: {:?}, tx: {:?}), using blocking transport", rx, tx);
				Transport::Blocking(Blocking)
			},
		}
	}

	pub fn is_offloaded(&self) -> bool {
		match self {
			Transport::Blocking(_) => false,
			Transport::Offloaded(_) => true,
		}
	}

	pub fn burst<H: Hardware + ?Sized>(
		&self,
		hardware: &mut H,
		mut transfer: Transfer,
		poll_limit: Option<u32>,
	) -> crate::AResult<()> {
		transfer.validate()?;
		if 0 == transfer.count {
			return Ok(());
		}
		match self {
			Transport::Blocking(t) => t.burst(hardware, &mut transfer, poll_limit),
			Transport::Offloaded(t) => t.burst(hardware, &mut transfer, poll_limit),
		}
	}
}

impl fmt::Display for Transport {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Transport::Blocking(_) => write!(f, "blocking"),
			Transport::Offloaded(o) => write!(f, "offloaded (rx {}, tx {})", o.rx, o.tx),
		}
	}
}

/// Busy-poll `ready` until it reports true; returns the number of polls.
///
/// Without a limit this spins forever on a device that never gets ready.
/// At least one poll is always made.
pub fn spin_until<F>(poll_limit: Option<u32>, what: &str, mut ready: F) -> crate::AResult<u32>
where
	F: FnMut() -> crate::AResult<bool>,
{
	let mut polls = 0u32;
	loop {
		polls = polls.saturating_add(1);
		if ready()? {
			return Ok(polls);
		}
		if let Some(limit) = poll_limit {
			ensure!(polls < limit, "{}: still busy after {} polls", what, polls);
		}
		std::hint::spin_loop();
	}
}
