use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;

use libc::{
	c_ulong,
	ioctl,
};

// _IOW('k', 0, char[32]): SPI_IOC_MESSAGE(1) with the generic ioctl layout
const SPI_IOC_MESSAGE_1: c_ulong = 0x4020_6b00;

/* struct spi_ioc_transfer from linux/spi/spidev.h */
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
	tx_buf: u64,
	rx_buf: u64,
	len: u32,
	speed_hz: u32,
	delay_usecs: u16,
	bits_per_word: u8,
	cs_change: u8,
	tx_nbits: u8,
	rx_nbits: u8,
	word_delay_usecs: u8,
	pad: u8,
}

/// Full duplex access to a spidev node. Mode, speed and word size are
/// whatever the platform configured.
pub struct Spidev {
	file: fs::File,
	path: String,
}

impl Spidev {
	pub fn path(&self) -> &str {
		&self.path
	}

	/// one message: `tx` goes out while `rx` gets filled
	pub fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
		if tx.len() != rx.len() {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "spidev transfer needs equal buffer lengths"));
		}
		if tx.is_empty() {
			return Ok(());
		}
		if tx.len() > u32::max_value() as usize {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "spidev transfer too long"));
		}

		let mut message = SpiIocTransfer {
			tx_buf: tx.as_ptr() as u64,
			rx_buf: rx.as_mut_ptr() as u64,
			len: tx.len() as u32,
			..SpiIocTransfer::default()
		};

		let res = unsafe {
			ioctl(self.file.as_raw_fd(), SPI_IOC_MESSAGE_1 as _, &mut message as *mut SpiIocTransfer)
		};
		if res < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}
}

pub fn open(path: &str) -> io::Result<Spidev> {
	let file = fs::OpenOptions::new()
		.read(true)
		.write(true)
		.open(path)?;

	Ok(Spidev {
		file,
		path: path.into(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transfer_struct_matches_kernel_layout() {
		assert_eq!(std::mem::size_of::<SpiIocTransfer>(), 32);
		assert_eq!((SPI_IOC_MESSAGE_1 >> 16) & 0x3fff, 32);
	}
}
