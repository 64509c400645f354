extern crate spi_eeprom;

use spi_eeprom::eeprom::{
	Geometry,
	READ_OPCODE,
	READ_STATUS_OPCODE,
	WRITE_ENABLE_OPCODE,
	WRITE_OPCODE,
};
use spi_eeprom::sim::SimulatedEeprom;
use spi_eeprom::*;

const CS: ChipSelect = ChipSelect { port: 0, pin: 8 };
const RX: ChannelId = ChannelId(0);
const TX: ChannelId = ChannelId(1);

fn device(write_cycle: u32) -> SimulatedEeprom {
	SimulatedEeprom::new(Geometry::default(), CS).with_write_cycle(write_cycle)
}

fn counter(len: usize) -> Vec<u8> {
	(0..len).map(|i| i as u8).collect()
}

#[test]
fn page_write_splits_at_page_boundaries() {
	let mut session = initialize(device(2), CS);
	let data = counter(150);
	session.page_write(0, &data).unwrap();

	let sim = session.hardware();
	let geometry = *sim.geometry();
	let writes = sim.frames_with(WRITE_OPCODE);
	let lengths: Vec<usize> = writes.iter().map(|f| f.data_out(&geometry).len()).collect();
	let mut expected = vec![16; 9];
	expected.push(6);
	assert_eq!(lengths, expected);
	let addresses: Vec<u32> = writes.iter().map(|f| f.address(&geometry).unwrap()).collect();
	assert_eq!(addresses, (0..10).map(|i| i * 16).collect::<Vec<u32>>());

	// WREN, WRITE, then polls until the write cycle is over
	let opcodes: Vec<u8> = sim.frames().iter().map(|f| f.opcode().unwrap()).collect();
	for chunk in opcodes.chunks(5) {
		assert_eq!(chunk, &[
			WRITE_ENABLE_OPCODE,
			WRITE_OPCODE,
			READ_STATUS_OPCODE,
			READ_STATUS_OPCODE,
			READ_STATUS_OPCODE,
		]);
	}
	assert_eq!(opcodes.len(), 50);
	assert_eq!(sim.status_polls(), 30);
	assert_eq!(sim.dropped_commands(), 0);
	assert_eq!(sim.rejected_writes(), 0);

	for (address, &byte) in data.iter().enumerate() {
		assert_eq!(sim.byte_at(address as u32), byte);
	}
	assert_eq!(session.cursor(), 150);
}

#[test]
fn unaligned_write_fills_first_page_only() {
	let mut session = initialize(device(0), CS);
	session.page_write(0x1c, &counter(10)).unwrap();

	let sim = session.hardware();
	let geometry = *sim.geometry();
	let writes: Vec<(u32, usize)> = sim.frames_with(WRITE_OPCODE).iter()
		.map(|f| (f.address(&geometry).unwrap(), f.data_out(&geometry).len()))
		.collect();
	assert_eq!(writes, vec![(0x1c, 4), (0x20, 6)]);
}

#[test]
fn write_wraps_at_top_of_address_space() {
	let mut session = initialize(device(1), CS);
	session.page_write(0xff_fffe, &[1, 2, 3, 4]).unwrap();

	let sim = session.hardware();
	let geometry = *sim.geometry();
	let writes: Vec<(u32, usize)> = sim.frames_with(WRITE_OPCODE).iter()
		.map(|f| (f.address(&geometry).unwrap(), f.data_out(&geometry).len()))
		.collect();
	assert_eq!(writes, vec![(0xff_fffe, 2), (0, 2)]);
	assert_eq!(sim.byte_at(0xff_fffe), 1);
	assert_eq!(sim.byte_at(0xff_ffff), 2);
	assert_eq!(sim.byte_at(0), 3);
	assert_eq!(sim.byte_at(1), 4);
	assert_eq!(session.cursor(), 2);
}

#[test]
fn address_above_width_is_masked() {
	let mut session = initialize(device(0), CS);
	session.byte_write(0x0100_0042, 0x99).unwrap();
	assert_eq!(session.hardware().byte_at(0x42), 0x99);
	assert_eq!(session.random_read(0x7f00_0042).unwrap(), 0x99);
	assert_eq!(session.cursor(), 0x43);
}

#[test]
fn read_back_what_was_written() {
	let mut session = initialize(device(3), CS);
	let data: Vec<u8> = (0..100u32).map(|i| (i * 7 + 3) as u8).collect();
	session.page_write(0x1234, &data).unwrap();

	let mut buffer = vec![0u8; data.len()];
	session.sequential_read(0x1234, &mut buffer).unwrap();
	assert_eq!(buffer, data);
	session.verify(0x1234, &data).unwrap();
}

#[test]
fn cursor_follows_reads_and_writes() {
	let mut sim = device(0);
	sim.load(0xff_fff0, &counter(16));
	sim.load(0, &[0xa0, 0xa1, 0xa2]);
	let mut session = initialize(sim, CS);

	let mut buffer = [0u8; 18];
	session.sequential_read(0xff_fff0, &mut buffer).unwrap();
	assert_eq!(&buffer[..16], &counter(16)[..]);
	assert_eq!(&buffer[16..], &[0xa0, 0xa1]);
	assert_eq!(session.cursor(), 2);
	assert_eq!(session.current_address_read().unwrap(), 0xa2);
	assert_eq!(session.cursor(), 3);

	session.page_write(0x200, &[5, 6]).unwrap();
	assert_eq!(session.cursor(), 0x202);
	let next = session.current_address_read().unwrap();
	assert_eq!(next, session.random_read(0x202).unwrap());
}

#[test]
fn byte_write_then_random_read() {
	let mut session = initialize(device(4), CS);
	session.byte_write(0x100, 0x5a).unwrap();
	assert_eq!(session.hardware().status_polls(), 5);
	assert_eq!(session.random_read(0x100).unwrap(), 0x5a);
	assert_eq!(session.cursor(), 0x101);
	assert_eq!(session.random_read(0x101).unwrap(), 0xff);
}

#[test]
fn idle_device_is_polled_once() {
	let mut session = initialize(device(5), CS);
	session.wait_until_ready().unwrap();

	let sim = session.hardware();
	assert_eq!(sim.status_polls(), 1);
	assert_eq!(sim.frames().len(), 1);
	assert_eq!(sim.frames()[0].opcode(), Some(READ_STATUS_OPCODE));
}

#[test]
fn read_status_reports_write_in_progress() {
	let mut sim = device(0);
	sim.set_busy(2);
	let mut session = initialize(sim, CS);
	assert!(session.read_status().unwrap().is_write_in_progress());
	session.wait_until_ready().unwrap();
	assert!(!session.read_status().unwrap().is_write_in_progress());
}

#[test]
fn read_clocks_fill_bytes() {
	let mut sim = device(0);
	sim.load(0x40, &counter(20));
	let mut session = initialize(sim, CS);

	let mut buffer = [0u8; 20];
	session.sequential_read(0x40, &mut buffer).unwrap();
	assert_eq!(&buffer[..], &counter(20)[..]);

	let sim = session.hardware();
	let geometry = *sim.geometry();
	let frames = sim.frames();
	assert_eq!(frames.len(), 1);
	assert_eq!(&frames[0].mosi[..4], &[READ_OPCODE, 0x00, 0x00, 0x40]);
	let data_out = frames[0].data_out(&geometry);
	assert_eq!(data_out.len(), 20);
	assert!(data_out.iter().all(|&b| b == 0xff));
}

#[test]
fn zero_length_requests_stay_off_the_bus() {
	let mut session = initialize(device(0), CS);
	session.page_write(0x0100_0005, &[]).unwrap();
	assert_eq!(session.cursor(), 5);
	session.sequential_read(7, &mut []).unwrap();
	assert_eq!(session.cursor(), 7);
	assert!(session.hardware().frames().is_empty());
}

#[test]
fn no_command_reaches_a_busy_device() {
	let mut session = initialize(device(10), CS);
	session.page_write(0x10, &counter(40)).unwrap();
	session.byte_write(0x80, 1).unwrap();
	let mut buffer = [0u8; 8];
	session.sequential_read(0x10, &mut buffer).unwrap();

	assert_eq!(session.hardware().dropped_commands(), 0);
	assert_eq!(&buffer[..], &counter(8)[..]);
}

#[test]
fn small_address_width() {
	let geometry = Geometry::new(9, 16).unwrap();
	let sim = SimulatedEeprom::new(geometry, CS);
	let config = Config { geometry, poll_limit: None };
	let mut session = initialize(sim, CS).with_config(config);

	session.page_write(0x1f8, &counter(16)).unwrap();
	let sim = session.hardware();
	let writes: Vec<(u32, usize)> = sim.frames_with(WRITE_OPCODE).iter()
		.map(|f| (f.address(&geometry).unwrap(), f.data_out(&geometry).len()))
		.collect();
	assert_eq!(writes, vec![(0x1f8, 8), (0, 8)]);
	assert_eq!(&sim.frames_with(WRITE_OPCODE)[0].mosi[..3], &[WRITE_OPCODE, 0x01, 0xf8]);
	assert_eq!(session.cursor(), 8);
}

#[test]
fn verify_reports_mismatch() {
	let mut session = initialize(device(0), CS);
	session.page_write(0, &[1, 2, 3]).unwrap();
	session.hardware_mut().load(1, &[9]);
	assert!(session.verify(0, &[1, 2, 3]).is_err());
	assert!(session.verify(0, &[1, 9, 3]).is_ok());
}

#[test]
fn borrowed_hardware() {
	let mut sim = device(1);
	{
		let mut session = initialize(&mut sim, CS);
		session.byte_write(3, 0x33).unwrap();
	}
	assert_eq!(sim.byte_at(3), 0x33);
	assert!(!sim.is_selected());
}

#[test]
fn poll_limit_gives_up_on_busy_device() {
	let mut sim = device(0);
	sim.set_busy(1000);
	let config = Config { poll_limit: Some(5), ..Config::default() };
	let mut session = initialize(sim, CS).with_config(config);

	assert!(session.wait_until_ready().is_err());
	assert_eq!(session.hardware().status_polls(), 5);
	assert!(!session.hardware().is_selected());
	assert!(session.hardware().is_busy());
}

fn exercise<H: Hardware>(session: &mut Session<H>) -> Vec<u8> {
	session.page_write(0xff_fff8, &counter(24)).unwrap();
	session.byte_write(0x30, 0xee).unwrap();
	let mut buffer = vec![0u8; 32];
	session.sequential_read(0xff_fff8, &mut buffer).unwrap();
	buffer.push(session.current_address_read().unwrap());
	buffer
}

#[test]
fn offloaded_transport_matches_blocking_traffic() {
	let mut blocking = initialize(device(2), CS);
	let mut offloaded = initialize_offloaded(device(2).with_completion_polls(3), CS, Some(RX), Some(TX));
	assert!(!blocking.transport().is_offloaded());
	assert!(offloaded.transport().is_offloaded());

	let read_blocking = exercise(&mut blocking);
	let read_offloaded = exercise(&mut offloaded);
	assert_eq!(read_blocking, read_offloaded);
	assert_eq!(&read_offloaded[..24], &counter(24)[..]);

	let frames_blocking = blocking.hardware().frames();
	let frames_offloaded = offloaded.hardware().frames();
	assert_eq!(frames_blocking.len(), frames_offloaded.len());
	for (b, o) in frames_blocking.iter().zip(frames_offloaded.iter()) {
		assert_eq!(b.mosi, o.mosi);
		assert_eq!(b.miso, o.miso);
		assert!(!b.offloaded);
		match o.opcode() {
			Some(READ_OPCODE) | Some(WRITE_OPCODE) => assert!(o.offloaded),
			_ => assert!(!o.offloaded),
		}
	}
}

#[test]
fn offload_needs_two_distinct_channels_and_an_engine() {
	let session = initialize_offloaded(device(0), CS, Some(RX), None);
	assert!(!session.transport().is_offloaded());

	let session = initialize_offloaded(device(0), CS, None, Some(TX));
	assert!(!session.transport().is_offloaded());

	let session = initialize_offloaded(device(0), CS, Some(TX), Some(TX));
	assert!(!session.transport().is_offloaded());

	let session = initialize_offloaded(device(0).without_offload(), CS, Some(RX), Some(TX));
	assert!(!session.transport().is_offloaded());
	assert_eq!(session.transport().to_string(), "blocking");

	let session = initialize_offloaded(device(0), CS, Some(RX), Some(TX));
	assert_eq!(session.transport().to_string(), "offloaded (rx ch0, tx ch1)");
}

#[test]
fn offloaded_burst_respects_poll_limit() {
	let sim = device(0).with_completion_polls(100);
	let config = Config { poll_limit: Some(3), ..Config::default() };
	let mut session = initialize_offloaded(sim, CS, Some(RX), Some(TX)).with_config(config);

	let mut buffer = [0u8; 4];
	assert!(session.sequential_read(0, &mut buffer).is_err());
	assert!(!session.hardware().is_selected());

	// channels got released, the next command works normally
	session.hardware_mut().take_frames();
	assert!(!session.read_status().unwrap().is_write_in_progress());
	assert_eq!(session.hardware().frames().len(), 1);
}
