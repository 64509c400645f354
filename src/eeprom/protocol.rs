use super::address::Geometry;
use super::consts::*;
use crate::hardware::{
	ChipSelect,
	Hardware,
	Level,
};
use crate::transport::{
	Transfer,
	Transport,
};

/// One command frame: chip-select stays asserted (low) from the opcode
/// until `end`, or until the transaction gets dropped on an error path.
pub struct Transaction<'a, H: ?Sized + Hardware + 'a> {
	hardware: &'a mut H,
	chip_select: ChipSelect,
	selected: bool,
}

impl<'a, H: ?Sized + Hardware> Transaction<'a, H> {
	/// assert chip-select and send the opcode
	pub fn begin(hardware: &'a mut H, chip_select: ChipSelect, opcode: u8) -> crate::AResult<Self> {
		hardware.drive_pin(chip_select, Level::Low)?;
		let mut tx = Transaction {
			hardware,
			chip_select,
			selected: true,
		};
		tx.exchange(opcode)?;
		Ok(tx)
	}

	pub fn exchange(&mut self, byte: u8) -> crate::AResult<u8> {
		self.hardware.exchange(byte)
	}

	/// masked address, most significant byte first
	pub fn send_address(&mut self, geometry: &Geometry, address: u32) -> crate::AResult<()> {
		let address = geometry.mask(address);
		for index in (0..geometry.address_bytes()).rev() {
			self.exchange((address >> (8 * index)) as u8)?;
		}
		Ok(())
	}

	pub fn data_phase(&mut self, transport: &Transport, transfer: Transfer, poll_limit: Option<u32>) -> crate::AResult<()> {
		transport.burst(&mut *self.hardware, transfer, poll_limit)
	}

	/// release chip-select
	pub fn end(mut self) -> crate::AResult<()> {
		self.selected = false;
		self.hardware.drive_pin(self.chip_select, Level::High)
	}
}

impl<'a, H: ?Sized + Hardware> Drop for Transaction<'a, H> {
	fn drop(&mut self) {
		if self.selected {
			if let Err(e) = self.hardware.drive_pin(self.chip_select, Level::High) {
				error!("Couldn't release chip-select {}: {}", self.chip_select, e);
			}
		}
	}
}

/// Everything a command needs besides the hardware.
#[derive(Clone, Copy, Debug)]
pub struct Framing<'c> {
	pub chip_select: ChipSelect,
	pub geometry: &'c Geometry,
	pub transport: &'c Transport,
	pub poll_limit: Option<u32>,
}

/// WREN in its own frame; the latch is consumed by the next write command
pub fn write_enable<H>(hardware: &mut H, framing: &Framing) -> crate::AResult<()>
where
	H: Hardware + ?Sized,
{
	Transaction::begin(hardware, framing.chip_select, WRITE_ENABLE_OPCODE)?.end()
}

/// WRITE frame; `data` must not cross a page boundary
pub fn write<H>(hardware: &mut H, framing: &Framing, address: u32, data: &[u8]) -> crate::AResult<()>
where
	H: Hardware + ?Sized,
{
	debug!("EEPROM write: {} bytes at 0x{:06x}", data.len(), framing.geometry.mask(address));
	let mut tx = Transaction::begin(hardware, framing.chip_select, WRITE_OPCODE)?;
	tx.send_address(framing.geometry, address)?;
	tx.data_phase(framing.transport, Transfer::transmit(data), framing.poll_limit)?;
	tx.end()
}

/// READ frame filling `buffer`
pub fn read<H>(hardware: &mut H, framing: &Framing, address: u32, buffer: &mut [u8]) -> crate::AResult<()>
where
	H: Hardware + ?Sized,
{
	debug!("EEPROM read: {} bytes at 0x{:06x}", buffer.len(), framing.geometry.mask(address));
	let mut tx = Transaction::begin(hardware, framing.chip_select, READ_OPCODE)?;
	tx.send_address(framing.geometry, address)?;
	tx.data_phase(framing.transport, Transfer::receive(buffer), framing.poll_limit)?;
	tx.end()
}
