//! Boundary between the driver and the platform.
//!
//! The platform brings up clocks, pins and the serial peripheral; the driver
//! only needs a way to clock single bytes through the bus, a way to drive the
//! chip-select pin, and optionally an engine that moves whole bursts.

use std::fmt;
use std::str;

use crate::transport::{
	Destination,
	Source,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Level {
	Low,
	High,
}

/// Chip-select line, identified by GPIO port and pin number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChipSelect {
	pub port: u8,
	pub pin: u8,
}

impl ChipSelect {
	pub fn new(port: u8, pin: u8) -> Self {
		ChipSelect { port, pin }
	}
}

impl fmt::Display for ChipSelect {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}.{}", self.port, self.pin)
	}
}

impl str::FromStr for ChipSelect {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let dot = match s.find('.') {
			Some(dot) => dot,
			None => bail!("Couldn't find '.' in chip-select port.pin: {:?}", s),
		};
		let (port_s, pin_s) = (&s[..dot], &s[dot + 1..]);

		let port = with_context!(("invalid chip-select port: {}", port_s),
			Ok(port_s.parse::<u8>()?)
		)?;
		let pin = with_context!(("invalid chip-select pin: {}", pin_s),
			Ok(pin_s.parse::<u8>()?)
		)?;

		ensure!(pin < 32, "invalid chip-select pin: {} (too big)", pin);

		Ok(ChipSelect { port, pin })
	}
}

/// Channel of an offload (DMA-style) engine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "ch{}", self.0)
	}
}

impl str::FromStr for ChannelId {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim_start_matches("ch");
		with_context!(("invalid offload channel: {}", s),
			Ok(ChannelId(s.parse::<u8>()?))
		)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Route {
	/// memory (or a constant) into the transmit register
	MemoryToBus,
	/// receive register into memory (or nowhere)
	BusToMemory,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ChannelSetup {
	pub route: Route,
	pub count: usize,
	pub memory_increment: bool,
}

/// Engine moving bytes between memory and the serial peripheral without
/// per-byte intervention.
///
/// A burst uses two channels: one feeding the transmit register, one
/// draining the receive register. Both get configured, then primed together;
/// the driver spins on `is_complete` and disables both channels afterwards.
///
/// Implementations that can't keep the borrowed buffers past `prime` have to
/// move the data before returning from it; completion is still reported
/// through `is_complete`.
pub trait OffloadEngine {
	fn configure(&mut self, channel: ChannelId, setup: ChannelSetup) -> crate::AResult<()>;

	fn prime(
		&mut self,
		tx: ChannelId,
		source: &Source,
		rx: ChannelId,
		destination: &mut Destination,
	) -> crate::AResult<()>;

	fn is_complete(&mut self, channel: ChannelId) -> crate::AResult<bool>;

	fn disable(&mut self, channel: ChannelId);
}

pub trait Hardware {
	/// clock one byte out and return the byte clocked in at the same time
	fn exchange(&mut self, byte: u8) -> crate::AResult<u8>;

	fn drive_pin(&mut self, pin: ChipSelect, level: Level) -> crate::AResult<()>;

	fn offload_engine(&mut self) -> Option<&mut dyn OffloadEngine> {
		None
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn exchange(&mut self, byte: u8) -> crate::AResult<u8> {
		H::exchange(*self, byte)
	}

	fn drive_pin(&mut self, pin: ChipSelect, level: Level) -> crate::AResult<()> {
		H::drive_pin(*self, pin, level)
	}

	fn offload_engine(&mut self) -> Option<&mut dyn OffloadEngine> {
		H::offload_engine(*self)
	}
}
