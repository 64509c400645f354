use std::fmt;

pub const DEFAULT_ADDRESS_BITS: u8 = 24;
pub const DEFAULT_PAGE_SIZE: u32 = 16;

/// Address width and page size of a device.
///
/// All addresses wrap modulo `2^address_bits`; a page is a power-of-two
/// aligned span no write command may cross.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Geometry {
	address_bits: u8,
	page_size: u32,
}

impl Default for Geometry {
	fn default() -> Self {
		Geometry {
			address_bits: DEFAULT_ADDRESS_BITS,
			page_size: DEFAULT_PAGE_SIZE,
		}
	}
}

impl Geometry {
	pub fn new(address_bits: u8, page_size: u32) -> crate::AResult<Self> {
		ensure!(address_bits >= 1 && address_bits <= 32, "invalid address width: {} bits (1..=32)", address_bits);
		ensure!(page_size.is_power_of_two(), "invalid page size: {} (must be a power of two)", page_size);
		ensure!(u64::from(page_size) <= 1u64 << address_bits,
			"page size {} larger than address space of {} bits", page_size, address_bits
		);
		Ok(Geometry { address_bits, page_size })
	}

	pub fn address_bits(&self) -> u8 {
		self.address_bits
	}

	pub fn page_size(&self) -> u32 {
		self.page_size
	}

	/// number of addressable bytes (may be 2^32)
	pub fn capacity(&self) -> u64 {
		1u64 << self.address_bits
	}

	/// bytes needed on the wire for an address
	pub fn address_bytes(&self) -> usize {
		(usize::from(self.address_bits) + 7) / 8
	}

	pub fn mask(&self, address: u32) -> u32 {
		(u64::from(address) & (self.capacity() - 1)) as u32
	}

	/// `mask(address + offset)`
	pub fn offset(&self, address: u32, offset: usize) -> u32 {
		let offset = (offset as u64 & (self.capacity() - 1)) as u32;
		self.mask(address.wrapping_add(offset))
	}

	/// First address after `address` that starts a new page. Equals
	/// `capacity()` inside the last page, so it is returned unmasked.
	pub fn next_page_boundary(&self, address: u32) -> u64 {
		let page_size = u64::from(self.page_size);
		(u64::from(self.mask(address)) + page_size) & !(page_size - 1)
	}

	/// how much of `remaining` fits before the next page boundary
	pub fn fragment_size(&self, address: u32, remaining: usize) -> usize {
		let room = self.next_page_boundary(address) - u64::from(self.mask(address));
		if (remaining as u64) < room {
			remaining
		} else {
			room as usize
		}
	}

	pub fn fragments(&self, address: u32, len: usize) -> Fragments {
		Fragments {
			geometry: *self,
			address: self.mask(address),
			remaining: len,
		}
	}
}

impl fmt::Display for Geometry {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}-bit addresses, {}-byte pages", self.address_bits, self.page_size)
	}
}

/// Page-safe pieces of a write: `(address, length)` pairs covering the
/// requested range in order.
#[derive(Clone, Debug)]
pub struct Fragments {
	geometry: Geometry,
	address: u32,
	remaining: usize,
}

impl Iterator for Fragments {
	type Item = (u32, usize);

	fn next(&mut self) -> Option<Self::Item> {
		if 0 == self.remaining {
			return None;
		}
		let address = self.address;
		let len = self.geometry.fragment_size(address, self.remaining);
		self.address = self.geometry.offset(address, len);
		self.remaining -= len;
		Some((address, len))
	}
}
