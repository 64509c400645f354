//! In-memory SPI EEPROM speaking the wire protocol byte by byte.
//!
//! Models what the driver has to get right: the write enable latch, the
//! internal write cycle (busy for a number of status polls, ignoring every
//! other command meanwhile), page wrap inside a single WRITE, and address
//! wrap at the top of the address space. Every chip-select frame is logged.
//!
//! It also acts as offload engine: a primed burst is clocked through the same
//! state machine, and the channels report completion after a configurable
//! number of polls.

use std::collections::BTreeMap;

use crate::eeprom::{
	Geometry,
	READ_OPCODE,
	READ_STATUS_OPCODE,
	WRITE_DISABLE_OPCODE,
	WRITE_ENABLE_OPCODE,
	WRITE_OPCODE,
};
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

const IDLE_BUS: u8 = 0xff;
const ERASED: u8 = 0xff;

/// One chip-select frame as seen on the wire.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Frame {
	pub mosi: Vec<u8>,
	pub miso: Vec<u8>,
	/// arrived during a write cycle and got ignored
	pub dropped: bool,
	/// data phase moved by the offload engine
	pub offloaded: bool,
}

impl Frame {
	pub fn opcode(&self) -> Option<u8> {
		self.mosi.first().cloned()
	}

	fn has_address(&self) -> bool {
		match self.opcode() {
			Some(READ_OPCODE) | Some(WRITE_OPCODE) => true,
			_ => false,
		}
	}

	fn data_offset(&self, geometry: &Geometry) -> usize {
		let offset = if self.has_address() { 1 + geometry.address_bytes() } else { 1 };
		offset.min(self.mosi.len())
	}

	pub fn address(&self, geometry: &Geometry) -> Option<u32> {
		if !self.has_address() || self.mosi.len() < 1 + geometry.address_bytes() {
			return None;
		}
		let raw = self.mosi[1..1 + geometry.address_bytes()].iter()
			.fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
		Some(geometry.mask(raw as u32))
	}

	/// bytes sent after opcode and address
	pub fn data_out(&self, geometry: &Geometry) -> &[u8] {
		&self.mosi[self.data_offset(geometry)..]
	}

	/// bytes received after opcode and address
	pub fn data_in(&self, geometry: &Geometry) -> &[u8] {
		&self.miso[self.data_offset(geometry)..]
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	Command,
	Address { opcode: u8, remaining: usize, address: u32 },
	Reading { address: u32 },
	Writing { start: u32 },
	Status,
	Ignored,
}

#[derive(Clone, Copy, Debug)]
struct Channel {
	setup: ChannelSetup,
	primed: bool,
	polls_left: u32,
}

pub struct SimulatedEeprom {
	geometry: Geometry,
	chip_select: ChipSelect,
	memory: BTreeMap<u32, u8>,

	selected: bool,
	state: State,
	frame: Frame,
	frames: Vec<Frame>,
	pending_write: Vec<u8>,

	write_enable_latch: bool,
	write_cycle_polls: u32,
	busy_polls_left: u32,

	offload: bool,
	completion_polls: u32,
	channels: BTreeMap<ChannelId, Channel>,

	status_polls: usize,
	rejected_writes: usize,
}

impl SimulatedEeprom {
	pub fn new(geometry: Geometry, chip_select: ChipSelect) -> Self {
		SimulatedEeprom {
			geometry,
			chip_select,
			memory: BTreeMap::new(),
			selected: false,
			state: State::Command,
			frame: Frame::default(),
			frames: Vec::new(),
			pending_write: Vec::new(),
			write_enable_latch: false,
			write_cycle_polls: 0,
			busy_polls_left: 0,
			offload: true,
			completion_polls: 0,
			channels: BTreeMap::new(),
			status_polls: 0,
			rejected_writes: 0,
		}
	}

	/// the next `polls` status reads after a write report write-in-progress
	pub fn with_write_cycle(mut self, polls: u32) -> Self {
		self.write_cycle_polls = polls;
		self
	}

	/// offloaded channels report completion only after `polls` busy polls
	pub fn with_completion_polls(mut self, polls: u32) -> Self {
		self.completion_polls = polls;
		self
	}

	pub fn without_offload(mut self) -> Self {
		self.offload = false;
		self
	}

	pub fn geometry(&self) -> &Geometry {
		&self.geometry
	}

	pub fn byte_at(&self, address: u32) -> u8 {
		self.memory.get(&self.geometry.mask(address)).cloned().unwrap_or(ERASED)
	}

	/// preset memory contents, bypassing the protocol
	pub fn load(&mut self, address: u32, data: &[u8]) {
		for (offset, &byte) in data.iter().enumerate() {
			let address = self.geometry.offset(address, offset);
			self.memory.insert(address, byte);
		}
	}

	/// start a write cycle as if a WRITE just finished
	pub fn set_busy(&mut self, polls: u32) {
		self.busy_polls_left = polls;
	}

	pub fn is_busy(&self) -> bool {
		self.busy_polls_left > 0
	}

	pub fn frames(&self) -> &[Frame] {
		&self.frames
	}

	pub fn take_frames(&mut self) -> Vec<Frame> {
		std::mem::replace(&mut self.frames, Vec::new())
	}

	/// frames with opcode `opcode`, in order
	pub fn frames_with(&self, opcode: u8) -> Vec<&Frame> {
		self.frames.iter().filter(|f| f.opcode() == Some(opcode)).collect()
	}

	pub fn status_polls(&self) -> usize {
		self.status_polls
	}

	/// commands that arrived during a write cycle
	pub fn dropped_commands(&self) -> usize {
		self.frames.iter().filter(|f| f.dropped).count()
	}

	/// WRITE commands without a preceding WREN
	pub fn rejected_writes(&self) -> usize {
		self.rejected_writes
	}

	pub fn is_selected(&self) -> bool {
		self.selected
	}

	fn status_byte(&self) -> u8 {
		let mut status = 0u8;
		if self.busy_polls_left > 0 { status |= 0x01; }
		if self.write_enable_latch { status |= 0x02; }
		status
	}

	fn clock(&mut self, mosi: u8) -> u8 {
		match self.state {
			State::Command => {
				if self.busy_polls_left > 0 && mosi != READ_STATUS_OPCODE {
					self.frame.dropped = true;
					self.state = State::Ignored;
					return IDLE_BUS;
				}
				self.state = match mosi {
					READ_OPCODE | WRITE_OPCODE => State::Address {
						opcode: mosi,
						remaining: self.geometry.address_bytes(),
						address: 0,
					},
					READ_STATUS_OPCODE => State::Status,
					// WREN / WRDI take effect when chip-select gets released
					_ => State::Ignored,
				};
				IDLE_BUS
			},
			State::Address { opcode, remaining, address } => {
				let address = (address << 8) | u32::from(mosi);
				let remaining = remaining - 1;
				self.state = if remaining > 0 {
					State::Address { opcode, remaining, address }
				} else if opcode == READ_OPCODE {
					State::Reading { address: self.geometry.mask(address) }
				} else {
					self.pending_write.clear();
					State::Writing { start: self.geometry.mask(address) }
				};
				IDLE_BUS
			},
			State::Reading { address } => {
				self.state = State::Reading { address: self.geometry.offset(address, 1) };
				self.byte_at(address)
			},
			State::Writing { .. } => {
				self.pending_write.push(mosi);
				IDLE_BUS
			},
			State::Status => {
				let status = self.status_byte();
				self.status_polls += 1;
				if self.busy_polls_left > 0 {
					self.busy_polls_left -= 1;
				}
				status
			},
			State::Ignored => IDLE_BUS,
		}
	}

	// chip-select released: commands take effect now
	fn finish_frame(&mut self) {
		let frame = std::mem::replace(&mut self.frame, Frame::default());
		if !frame.dropped {
			match (frame.opcode(), self.state) {
				(Some(WRITE_ENABLE_OPCODE), _) if frame.mosi.len() == 1 => {
					self.write_enable_latch = true;
				},
				(Some(WRITE_DISABLE_OPCODE), _) if frame.mosi.len() == 1 => {
					self.write_enable_latch = false;
				},
				(Some(WRITE_OPCODE), State::Writing { start }) => {
					if self.write_enable_latch {
						self.commit_write(start);
					} else {
						self.rejected_writes += 1;
					}
				},
				(Some(WRITE_OPCODE), _) => {
					// incomplete address
					self.write_enable_latch = false;
				},
				_ => (),
			}
		}
		self.state = State::Command;
		self.frames.push(frame);
	}

	// a WRITE wraps around inside its page, like the real devices do
	fn commit_write(&mut self, start: u32) {
		self.write_enable_latch = false;
		if self.pending_write.is_empty() {
			return;
		}
		let page_mask = self.geometry.page_size() - 1;
		let page_base = start & !page_mask;
		let data = std::mem::replace(&mut self.pending_write, Vec::new());
		for (offset, byte) in data.into_iter().enumerate() {
			let address = page_base | (start.wrapping_add(offset as u32) & page_mask);
			self.memory.insert(address, byte);
		}
		self.busy_polls_left = self.write_cycle_polls;
	}

	fn channel(&self, channel: ChannelId) -> crate::AResult<Channel> {
		match self.channels.get(&channel) {
			Some(c) => Ok(*c),
			None => bail!("offload channel {} not configured", channel),
		}
	}
}

impl Hardware for SimulatedEeprom {
	fn exchange(&mut self, byte: u8) -> crate::AResult<u8> {
		ensure!(self.selected, "byte 0x{:02x} clocked while chip-select {} is released", byte, self.chip_select);
		let miso = self.clock(byte);
		self.frame.mosi.push(byte);
		self.frame.miso.push(miso);
		Ok(miso)
	}

	fn drive_pin(&mut self, pin: ChipSelect, level: Level) -> crate::AResult<()> {
		ensure!(pin == self.chip_select, "pin {} is not the chip-select {} of this EEPROM", pin, self.chip_select);
		match level {
			Level::Low => {
				ensure!(!self.selected, "chip-select {} asserted twice", pin);
				self.selected = true;
				self.state = State::Command;
			},
			Level::High => {
				if self.selected {
					self.selected = false;
					self.finish_frame();
				}
			},
		}
		Ok(())
	}

	fn offload_engine(&mut self) -> Option<&mut dyn OffloadEngine> {
		if self.offload {
			Some(self)
		} else {
			None
		}
	}
}

impl OffloadEngine for SimulatedEeprom {
	fn configure(&mut self, channel: ChannelId, setup: ChannelSetup) -> crate::AResult<()> {
		if let Some(c) = self.channels.get(&channel) {
			ensure!(!c.primed, "offload channel {} reconfigured while active", channel);
		}
		self.channels.insert(channel, Channel {
			setup,
			primed: false,
			polls_left: 0,
		});
		Ok(())
	}

	fn prime(
		&mut self,
		tx: ChannelId,
		source: &Source,
		rx: ChannelId,
		destination: &mut Destination,
	) -> crate::AResult<()> {
		let tx_channel = self.channel(tx)?;
		let rx_channel = self.channel(rx)?;
		ensure!(tx_channel.setup.route == Route::MemoryToBus, "offload channel {} doesn't feed the bus", tx);
		ensure!(rx_channel.setup.route == Route::BusToMemory, "offload channel {} doesn't drain the bus", rx);
		ensure!(tx_channel.setup.count == rx_channel.setup.count,
			"offload channels disagree on burst length ({} vs {})", tx_channel.setup.count, rx_channel.setup.count
		);

		for position in 0..tx_channel.setup.count {
			let mosi = source.byte(position, tx_channel.setup.memory_increment);
			let miso = self.exchange(mosi)?;
			destination.store(position, rx_channel.setup.memory_increment, miso);
		}
		self.frame.offloaded = true;

		for &channel in [tx, rx].iter() {
			if let Some(c) = self.channels.get_mut(&channel) {
				c.primed = true;
				c.polls_left = self.completion_polls;
			}
		}
		Ok(())
	}

	fn is_complete(&mut self, channel: ChannelId) -> crate::AResult<bool> {
		let c = match self.channels.get_mut(&channel) {
			Some(c) => c,
			None => bail!("offload channel {} not configured", channel),
		};
		ensure!(c.primed, "offload channel {} polled before priming", channel);
		if c.polls_left > 0 {
			c.polls_left -= 1;
			return Ok(false);
		}
		Ok(true)
	}

	fn disable(&mut self, channel: ChannelId) {
		self.channels.remove(&channel);
	}
}
