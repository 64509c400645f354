//! Driver for SPI serial EEPROMs (25xx-style devices).
//!
//! Instructions (one chip-select frame each):
//! - READ  (0x03) + address, then any number of data bytes out of the device
//! - WRITE (0x02) + address, then up to one page of data into the device
//! - WREN  (0x06) sets the write enable latch, consumed by the next WRITE
//! - RDSR  (0x05) returns the status register; bit 0 is write-in-progress
//!
//! Addresses are sent most significant byte first, using as many bytes as
//! the address width needs. After a WRITE the device runs an internal write
//! cycle and ignores anything but RDSR until it completes, so every write
//! fragment is followed by polling the status register.

pub mod address;
pub mod protocol;
pub mod status;

use crate::hardware::{
	ChannelId,
	ChipSelect,
	Hardware,
};
use crate::transport::Transport;

pub use self::address::Geometry;
pub use self::status::StatusRegister;

use self::protocol::Framing;

#[allow(dead_code)]
mod consts {
	pub const WRITE_OPCODE:        u8 = 0x02; // write data; needs WEL, clears it when CS gets released
	pub const READ_OPCODE:         u8 = 0x03; // read data
	pub const WRITE_DISABLE_OPCODE: u8 = 0x04; // "WRDI", clears WEL
	pub const READ_STATUS_OPCODE:  u8 = 0x05; // "RDSR"
	pub const WRITE_ENABLE_OPCODE: u8 = 0x06; // "WREN", sets WEL
}

pub use self::consts::*;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Config {
	pub geometry: Geometry,
	/// Give up on the device (write cycle, offloaded transfer) after this
	/// many busy polls. `None` waits forever.
	pub poll_limit: Option<u32>,
}

pub struct Session<H: Hardware> {
	hardware: H,
	chip_select: ChipSelect,
	cursor: u32,
	config: Config,
	transport: Transport,
}

/// session exchanging every byte through `Hardware::exchange`
pub fn initialize<H: Hardware>(hardware: H, chip_select: ChipSelect) -> Session<H> {
	initialize_offloaded(hardware, chip_select, None, None)
}

/// Session moving data phases through the hardware's offload engine.
///
/// Uses the blocking transport unless both channels are given, differ from
/// each other and the hardware actually has an offload engine.
pub fn initialize_offloaded<H: Hardware>(
	mut hardware: H,
	chip_select: ChipSelect,
	rx: Option<ChannelId>,
	tx: Option<ChannelId>,
) -> Session<H> {
	let transport = Transport::select(&mut hardware, rx, tx);
	debug!("EEPROM on chip-select {}: {} transport", chip_select, transport);
	Session {
		hardware,
		chip_select,
		cursor: 0,
		config: Config::default(),
		transport,
	}
}

impl<H: Hardware> Session<H> {
	pub fn with_config(mut self, config: Config) -> Self {
		self.config = config;
		self.cursor = config.geometry.mask(self.cursor);
		self
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn geometry(&self) -> &Geometry {
		&self.config.geometry
	}

	pub fn transport(&self) -> &Transport {
		&self.transport
	}

	pub fn chip_select(&self) -> ChipSelect {
		self.chip_select
	}

	/// address the next `current_address_read` reads from
	pub fn cursor(&self) -> u32 {
		self.cursor
	}

	pub fn hardware(&self) -> &H {
		&self.hardware
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		&mut self.hardware
	}

	pub fn into_hardware(self) -> H {
		self.hardware
	}

	fn split(&mut self) -> (&mut H, Framing<'_>) {
		let framing = Framing {
			chip_select: self.chip_select,
			geometry: &self.config.geometry,
			transport: &self.transport,
			poll_limit: self.config.poll_limit,
		};
		(&mut self.hardware, framing)
	}

	pub fn read_status(&mut self) -> crate::AResult<StatusRegister> {
		with_context!("EEPROM status read", {
			status::read_status(&mut self.hardware, self.chip_select)
		})
	}

	/// Blocks until the device finished its write cycle. Polls once if the
	/// device is idle.
	pub fn wait_until_ready(&mut self) -> crate::AResult<()> {
		let (chip_select, poll_limit) = (self.chip_select, self.config.poll_limit);
		let polls = status::wait_until_ready(&mut self.hardware, chip_select, poll_limit)?;
		trace!("EEPROM ready after {} status polls", polls);
		Ok(())
	}

	pub fn byte_write(&mut self, address: u32, data: u8) -> crate::AResult<()> {
		self.page_write(address, &[data])
	}

	/// Write `data` starting at `address` (masked), one page-safe fragment
	/// per WRITE command, waiting for each write cycle to finish.
	pub fn page_write(&mut self, address: u32, data: &[u8]) -> crate::AResult<()> {
		let geometry = self.config.geometry;
		let mut offset = 0;
		for (fragment_address, len) in geometry.fragments(address, data.len()) {
			let fragment = &data[offset..offset + len];
			with_context!(("EEPROM write at 0x{:06x}", fragment_address), {
				let (hardware, framing) = self.split();
				protocol::write_enable(&mut *hardware, &framing)?;
				protocol::write(&mut *hardware, &framing, fragment_address, fragment)?;
				Ok(())
			})?;
			self.wait_until_ready()?;
			offset += len;
		}
		self.cursor = geometry.offset(address, data.len());
		Ok(())
	}

	/// Fill `buffer` starting at `address` (masked); the device wraps at
	/// the top of its address space.
	pub fn sequential_read(&mut self, address: u32, buffer: &mut [u8]) -> crate::AResult<()> {
		if !buffer.is_empty() {
			let masked = self.config.geometry.mask(address);
			with_context!(("EEPROM read at 0x{:06x}", masked), {
				let (hardware, framing) = self.split();
				protocol::read(hardware, &framing, address, buffer)
			})?;
		}
		self.cursor = self.config.geometry.offset(address, buffer.len());
		Ok(())
	}

	pub fn random_read(&mut self, address: u32) -> crate::AResult<u8> {
		let mut data = [0u8; 1];
		self.sequential_read(address, &mut data)?;
		Ok(data[0])
	}

	/// read the byte after the last one read or written
	pub fn current_address_read(&mut self) -> crate::AResult<u8> {
		let address = self.cursor;
		self.random_read(address)
	}

	/// read back `expected` starting at `address` and compare
	pub fn verify(&mut self, address: u32, expected: &[u8]) -> crate::AResult<()> {
		let mut actual = vec![0u8; expected.len()];
		self.sequential_read(address, &mut actual)?;
		for (offset, (&want, &got)) in expected.iter().zip(actual.iter()).enumerate() {
			ensure!(want == got,
				"Verify failed at 0x{:06x}: expected {:02x}, EEPROM has {:02x}",
				self.config.geometry.offset(address, offset), want, got
			);
		}
		Ok(())
	}
}
