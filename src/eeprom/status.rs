use std::fmt;

use super::consts::READ_STATUS_OPCODE;
use super::protocol::Transaction;
use crate::hardware::{
	ChipSelect,
	Hardware,
};
use crate::transport::{
	FILL_BYTE,
	spin_until,
};

const STATUS_WRITE_IN_PROGRESS:  u8 = 0x01;
const STATUS_WRITE_ENABLE_LATCH: u8 = 0x02;
const STATUS_BLOCK_PROTECT_MASK: u8 = 0x0c;
const STATUS_BLOCK_PROTECT_SHIFT: u8 = 2;
const STATUS_WRITE_PROTECT:      u8 = 0x80;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusRegister(pub u8);

impl StatusRegister {
	pub fn is_write_in_progress(&self) -> bool {
		0 != self.0 & STATUS_WRITE_IN_PROGRESS
	}
	pub fn is_write_enabled(&self) -> bool {
		0 != self.0 & STATUS_WRITE_ENABLE_LATCH
	}
	pub fn block_protect(&self) -> u8 {
		(self.0 & STATUS_BLOCK_PROTECT_MASK) >> STATUS_BLOCK_PROTECT_SHIFT
	}
	pub fn is_status_write_protected(&self) -> bool {
		0 != self.0 & STATUS_WRITE_PROTECT
	}
}

impl fmt::Display for StatusRegister {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl fmt::Debug for StatusRegister {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x} (block protect: {}", self.0, self.block_protect())?;
		if self.is_write_in_progress() { write!(f, " [WIP]")?; }
		if self.is_write_enabled() { write!(f, " [WEL]")?; }
		if self.is_status_write_protected() { write!(f, " [WPEN]")?; }
		write!(f, ")")
	}
}

/// one RDSR transaction
pub fn read_status<H>(hardware: &mut H, chip_select: ChipSelect) -> crate::AResult<StatusRegister>
where
	H: Hardware + ?Sized,
{
	let mut tx = Transaction::begin(hardware, chip_select, READ_STATUS_OPCODE)?;
	let status = StatusRegister(tx.exchange(FILL_BYTE)?);
	tx.end()?;
	trace!("EEPROM status: {:?}", status);
	Ok(status)
}

/// Poll the status register until the write cycle is done; returns the
/// number of polls (one if the device was idle already).
///
/// A device busy for good keeps this spinning unless `poll_limit` is set.
pub fn wait_until_ready<H>(hardware: &mut H, chip_select: ChipSelect, poll_limit: Option<u32>) -> crate::AResult<u32>
where
	H: Hardware + ?Sized,
{
	spin_until(poll_limit, "EEPROM write cycle", || {
		Ok(!read_status(&mut *hardware, chip_select)?.is_write_in_progress())
	})
}
