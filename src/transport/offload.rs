use super::{
	BurstTransport,
	Transfer,
	spin_until,
};
use crate::hardware::{
	ChannelId,
	ChannelSetup,
	Hardware,
	OffloadEngine,
	Route,
};

/// Burst moved by the hardware's offload engine: `tx` feeds the transmit
/// register, `rx` drains the receive register.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Offloaded {
	pub rx: ChannelId,
	pub tx: ChannelId,
}

impl Offloaded {
	fn run(&self, engine: &mut dyn OffloadEngine, transfer: &mut Transfer, poll_limit: Option<u32>) -> crate::AResult<()> {
		engine.configure(self.tx, ChannelSetup {
			route: Route::MemoryToBus,
			count: transfer.count,
			memory_increment: transfer.source_increment,
		})?;
		engine.configure(self.rx, ChannelSetup {
			route: Route::BusToMemory,
			count: transfer.count,
			memory_increment: transfer.destination_increment,
		})?;

		engine.prime(self.tx, &transfer.source, self.rx, &mut transfer.destination)?;

		// the last received byte can't arrive before the last one was sent,
		// but check both to catch a stuck feed channel
		let (tx, rx) = (self.tx, self.rx);
		let polls = spin_until(poll_limit, "offloaded transfer", || {
			Ok(engine.is_complete(rx)? && engine.is_complete(tx)?)
		})?;
		debug!("Offloaded burst of {} bytes done after {} polls", transfer.count, polls);

		Ok(())
	}
}

impl BurstTransport for Offloaded {
	fn burst<H: Hardware + ?Sized>(
		&self,
		hardware: &mut H,
		transfer: &mut Transfer,
		poll_limit: Option<u32>,
	) -> crate::AResult<()> {
		let engine = match hardware.offload_engine() {
			Some(engine) => engine,
			None => bail!("offload engine not available (channels rx {}, tx {})", self.rx, self.tx),
		};

		let result = self.run(&mut *engine, transfer, poll_limit);
		// leave both channels idle, also after a failed transfer
		engine.disable(self.tx);
		engine.disable(self.rx);

		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hardware::{
		ChipSelect,
		Level,
	};
	use crate::transport::{
		Destination,
		Source,
	};

	#[derive(Default)]
	struct Engine {
		sent: Vec<u8>,
		setups: Vec<(ChannelId, ChannelSetup)>,
		disabled: Vec<ChannelId>,
		busy_polls: u32,
		fail_prime: bool,
	}

	impl OffloadEngine for Engine {
		fn configure(&mut self, channel: ChannelId, setup: ChannelSetup) -> crate::AResult<()> {
			self.setups.push((channel, setup));
			Ok(())
		}

		fn prime(&mut self, _tx: ChannelId, source: &Source, _rx: ChannelId, destination: &mut Destination) -> crate::AResult<()> {
			ensure!(!self.fail_prime, "prime failed");
			let (_, tx_setup) = self.setups[0];
			let (_, rx_setup) = self.setups[1];
			for position in 0..tx_setup.count {
				let byte = source.byte(position, tx_setup.memory_increment);
				self.sent.push(byte);
				destination.store(position, rx_setup.memory_increment, byte.rotate_left(4));
			}
			Ok(())
		}

		fn is_complete(&mut self, _channel: ChannelId) -> crate::AResult<bool> {
			if self.busy_polls > 0 {
				self.busy_polls -= 1;
				return Ok(false);
			}
			Ok(true)
		}

		fn disable(&mut self, channel: ChannelId) {
			self.disabled.push(channel);
		}
	}

	struct Bus {
		engine: Option<Engine>,
	}

	impl Hardware for Bus {
		fn exchange(&mut self, _byte: u8) -> crate::AResult<u8> {
			bail!("offloaded burst must not exchange single bytes")
		}

		fn drive_pin(&mut self, _pin: ChipSelect, _level: Level) -> crate::AResult<()> {
			Ok(())
		}

		fn offload_engine(&mut self) -> Option<&mut dyn OffloadEngine> {
			match self.engine {
				Some(ref mut engine) => Some(engine),
				None => None,
			}
		}
	}

	const CHANNELS: Offloaded = Offloaded { rx: ChannelId(1), tx: ChannelId(0) };

	#[test]
	fn configures_both_channels() {
		let mut bus = Bus { engine: Some(Engine { busy_polls: 3, ..Engine::default() }) };
		let mut received = [0u8; 2];
		let mut t = Transfer::receive(&mut received);
		CHANNELS.burst(&mut bus, &mut t, None).unwrap();
		drop(t);
		assert_eq!(received, [0xff, 0xff]);

		let engine = bus.engine.unwrap();
		assert_eq!(engine.sent, [0xff, 0xff]);
		assert_eq!(engine.setups, vec![
			(ChannelId(0), ChannelSetup { route: Route::MemoryToBus, count: 2, memory_increment: false }),
			(ChannelId(1), ChannelSetup { route: Route::BusToMemory, count: 2, memory_increment: true }),
		]);
		assert_eq!(engine.disabled, vec![ChannelId(0), ChannelId(1)]);
	}

	#[test]
	fn disables_channels_after_failure() {
		let mut bus = Bus { engine: Some(Engine { fail_prime: true, ..Engine::default() }) };
		let data = [1u8, 2, 3];
		let mut t = Transfer::transmit(&data);
		assert!(CHANNELS.burst(&mut bus, &mut t, None).is_err());
		assert_eq!(bus.engine.unwrap().disabled, vec![ChannelId(0), ChannelId(1)]);
	}

	#[test]
	fn completion_wait_honours_limit() {
		let mut bus = Bus { engine: Some(Engine { busy_polls: 10, ..Engine::default() }) };
		let data = [1u8];
		let mut t = Transfer::transmit(&data);
		assert!(CHANNELS.burst(&mut bus, &mut t, Some(4)).is_err());
	}

	#[test]
	fn missing_engine_is_an_error() {
		let mut bus = Bus { engine: None };
		let data = [1u8];
		let mut t = Transfer::transmit(&data);
		assert!(CHANNELS.burst(&mut bus, &mut t, None).is_err());
	}
}
