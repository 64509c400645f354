//! `Hardware` on Linux: bytes through a spidev node, chip-select through a
//! sysfs GPIO.
//!
//! The spidev device has to be set up without its own chip-select handling
//! (SPI_NO_CS, or a native CS line that isn't wired to the EEPROM): the
//! driver frames commands itself and needs chip-select held across several
//! messages.
//!
//! A single spidev message moves a whole burst without per-byte round trips
//! through user space, so the device doubles as offload engine. The channel
//! ids only name the two directions of that message.

mod gpio;
mod spidev;

use std::collections::BTreeMap;

use crate::hardware::{
	ChannelId,
	ChannelSetup,
	ChipSelect,
	Hardware,
	Level,
	OffloadEngine,
	Route,
};
use crate::transport::{
	Destination,
	Source,
};

pub use self::gpio::gpio_number;

struct Channel {
	setup: ChannelSetup,
	done: bool,
}

pub struct SpidevHardware {
	spi: spidev::Spidev,
	outputs: BTreeMap<ChipSelect, gpio::GpioOutput>,
	channels: BTreeMap<ChannelId, Channel>,
}

impl SpidevHardware {
	pub fn path(&self) -> &str {
		self.spi.path()
	}

	fn channel_setup(&self, channel: ChannelId, route: Route) -> crate::AResult<ChannelSetup> {
		match self.channels.get(&channel) {
			Some(c) => {
				ensure!(c.setup.route == route, "channel {} configured for {:?}, not {:?}", channel, c.setup.route, route);
				Ok(c.setup)
			},
			None => bail!("channel {} not configured", channel),
		}
	}
}

pub fn open(path: &str) -> crate::AResult<SpidevHardware> {
	let spi = with_context!(("couldn't open spidev {}", path), {
		Ok(spidev::open(path)?)
	})?;
	Ok(SpidevHardware {
		spi,
		outputs: BTreeMap::new(),
		channels: BTreeMap::new(),
	})
}

impl Hardware for SpidevHardware {
	fn exchange(&mut self, byte: u8) -> crate::AResult<u8> {
		let mut rx = [0u8; 1];
		let res = self.spi.transfer(&[byte], &mut rx);
		with_context!(("spidev {} exchange", self.spi.path()), Ok(res?))?;
		Ok(rx[0])
	}

	fn drive_pin(&mut self, pin: ChipSelect, level: Level) -> crate::AResult<()> {
		if !self.outputs.contains_key(&pin) {
			let output = gpio::open_output(pin)?;
			debug!("Chip-select {} is GPIO {}", pin, output.number());
			self.outputs.insert(pin, output);
		}
		let output = match self.outputs.get_mut(&pin) {
			Some(output) => output,
			None => bail!("chip-select {} not available", pin),
		};
		with_context!(("chip-select {}", pin), {
			Ok(output.set(level)?)
		})
	}

	fn offload_engine(&mut self) -> Option<&mut dyn OffloadEngine> {
		Some(self)
	}
}

impl OffloadEngine for SpidevHardware {
	fn configure(&mut self, channel: ChannelId, setup: ChannelSetup) -> crate::AResult<()> {
		self.channels.insert(channel, Channel { setup, done: false });
		Ok(())
	}

	fn prime(
		&mut self,
		tx: ChannelId,
		source: &Source,
		rx: ChannelId,
		destination: &mut Destination,
	) -> crate::AResult<()> {
		let tx_setup = self.channel_setup(tx, Route::MemoryToBus)?;
		let rx_setup = self.channel_setup(rx, Route::BusToMemory)?;
		ensure!(tx_setup.count == rx_setup.count,
			"channels disagree on burst length ({} vs {})", tx_setup.count, rx_setup.count
		);

		let outgoing: Vec<u8> = (0..tx_setup.count)
			.map(|position| source.byte(position, tx_setup.memory_increment))
			.collect();
		let mut incoming = vec![0u8; rx_setup.count];
		let res = self.spi.transfer(&outgoing, &mut incoming);
		with_context!(("spidev {} burst of {} bytes", self.spi.path(), outgoing.len()), Ok(res?))?;
		for (position, &byte) in incoming.iter().enumerate() {
			destination.store(position, rx_setup.memory_increment, byte);
		}

		for channel in [tx, rx].iter() {
			if let Some(c) = self.channels.get_mut(channel) {
				c.done = true;
			}
		}
		Ok(())
	}

	fn is_complete(&mut self, channel: ChannelId) -> crate::AResult<bool> {
		match self.channels.get(&channel) {
			Some(c) => Ok(c.done),
			None => bail!("channel {} not configured", channel),
		}
	}

	fn disable(&mut self, channel: ChannelId) {
		self.channels.remove(&channel);
	}
}
