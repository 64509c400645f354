use super::{
	BurstTransport,
	Transfer,
};
use crate::hardware::Hardware;

/// Per-byte exchange: send the current source byte, store the byte received
/// in the same clock cycles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Blocking;

impl BurstTransport for Blocking {
	fn burst<H: Hardware + ?Sized>(
		&self,
		hardware: &mut H,
		transfer: &mut Transfer,
		_poll_limit: Option<u32>,
	) -> crate::AResult<()> {
		for position in 0..transfer.count {
			let received = hardware.exchange(transfer.source_byte(position))?;
			transfer.store(position, received);
		}
		Ok(())
	}
}
