#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate spi_eeprom;
use spi_eeprom::*;

use std::io::{
	self,
	Write,
};
use std::process::exit;

use spi_eeprom::eeprom::Geometry;
use spi_eeprom::sim::SimulatedEeprom;

// status polls the simulated device stays busy after each write
const SIMULATED_WRITE_CYCLE: u32 = 3;

const SELFTEST_BYTES: [u8; 6] = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
const SELFTEST_PAGE_LENGTH: usize = 150;

/// decimal or 0x-prefixed hex
#[derive(Clone, Copy, Debug)]
struct Number(u32);

impl std::str::FromStr for Number {
	type Err = failure::Error;

	fn from_str(s: &str) -> AResult<Self> {
		let value = if s.starts_with("0x") || s.starts_with("0X") {
			u32::from_str_radix(&s[2..], 16)?
		} else {
			s.parse::<u32>()?
		};
		Ok(Number(value))
	}
}

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid paramater {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_optional_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<Option<T>>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		Ok(Some(get_param(matches, name)?))
	} else {
		Ok(None)
	}
}

/// "RX,TX"; an empty side leaves that channel unset
fn parse_offload(s: &str) -> AResult<(Option<ChannelId>, Option<ChannelId>)> {
	let mut parts = s.splitn(2, ',');
	let mut next = || -> AResult<Option<ChannelId>> {
		match parts.next().map(str::trim) {
			None | Some("") => Ok(None),
			Some(p) => Ok(Some(p.parse()?)),
		}
	};
	let rx = next()?;
	let tx = next()?;
	Ok((rx, tx))
}

fn build_config(matches: &clap::ArgMatches) -> AResult<Config> {
	let defaults = Geometry::default();
	let address_bits = get_optional_param::<u8>(matches, "address-bits")?
		.unwrap_or(defaults.address_bits());
	let page_size = get_optional_param::<Number>(matches, "page-size")?
		.map_or(defaults.page_size(), |n| n.0);
	Ok(Config {
		geometry: Geometry::new(address_bits, page_size)?,
		poll_limit: get_optional_param(matches, "poll-limit")?,
	})
}

/// row labels follow `geometry`, so a wrapped read restarts at 0
fn hexdump<W: Write>(out: &mut W, geometry: &Geometry, start: u32, data: &[u8]) -> io::Result<()> {
	for i in 0..data.len() {
		if 0 == i % 16 {
			write!(out, "{:08x} ", geometry.offset(start, i))?;
		} else if 0 == i % 8 {
			write!(out, " ")?;
		}
		write!(out, " {:02x}", data[i])?;
		if 15 == i % 16 {
			writeln!(out, "")?;
		}
	}
	if 0 != data.len() % 16 {
		writeln!(out, "")?;
	}
	Ok(())
}

fn parse_byte(s: &str) -> AResult<u8> {
	let digits = s.trim_start_matches("0x");
	u8::from_str_radix(digits, 16).map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid byte {:?}: {}", s, e);
		e.context(msg).into()
	})
}

fn read<H: Hardware>(session: &mut Session<H>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: Number = get_param(sub_m, "ADDRESS")?;
	let length: Number = get_param(sub_m, "LENGTH")?;

	let mut data = vec![0u8; length.0 as usize];
	session.sequential_read(address.0, &mut data)?;
	let stdout = io::stdout();
	hexdump(&mut stdout.lock(), session.geometry(), address.0, &data)?;

	Ok(())
}

fn write<H: Hardware>(session: &mut Session<H>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: Number = get_param(sub_m, "ADDRESS")?;
	let mut data = Vec::new();
	for byte in sub_m.values_of("BYTES").into_iter().flatten() {
		data.push(parse_byte(byte)?);
	}

	session.page_write(address.0, &data)?;
	info!("Wrote {} bytes at 0x{:06x}", data.len(), session.geometry().mask(address.0));

	if sub_m.is_present("verify") {
		session.verify(address.0, &data)?;
		info!("Write verified successfully");
	}

	Ok(())
}

fn status<H: Hardware>(session: &mut Session<H>) -> AResult<()> {
	println!("{:?}", session.read_status()?);
	Ok(())
}

fn selftest<H: Hardware>(session: &mut Session<H>) -> AResult<()> {
	for (address, &byte) in SELFTEST_BYTES.iter().enumerate() {
		session.byte_write(address as u32, byte)?;
	}

	let first = session.random_read(0)?;
	ensure!(first == SELFTEST_BYTES[0], "random read at 0: expected {:02x}, got {:02x}", SELFTEST_BYTES[0], first);
	for (address, &want) in SELFTEST_BYTES.iter().enumerate().skip(1) {
		let got = session.current_address_read()?;
		ensure!(want == got, "current address read at {}: expected {:02x}, got {:02x}", address, want, got);
	}
	info!("Byte writes read back successfully");

	let pattern: Vec<u8> = (0..SELFTEST_PAGE_LENGTH).map(|i| i as u8).collect();
	session.page_write(0, &pattern)?;
	session.verify(0, &pattern)?;
	info!("Page write of {} bytes verified successfully", pattern.len());

	info!("Self test passed ({} transport)", session.transport());
	Ok(())
}

fn run<H: Hardware>(
	hardware: H,
	chip_select: ChipSelect,
	config: Config,
	matches: &clap::ArgMatches,
) -> AResult<()> {
	let mut session = match matches.value_of("offload") {
		Some(channels) => {
			let (rx, tx) = parse_offload(channels)?;
			initialize_offloaded(hardware, chip_select, rx, tx)
		},
		None => initialize(hardware, chip_select),
	}.with_config(config);

	match matches.subcommand() {
		("read", Some(sub_m)) => {
			read(&mut session, sub_m)
		}
		("write", Some(sub_m)) => {
			write(&mut session, sub_m)
		}
		("status", _) => {
			status(&mut session)
		}
		("selftest", _) => {
			selftest(&mut session)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg device: -d --device +takes_value "spidev device node (default /dev/spidev0.0)")
		(@arg cs: -c --cs +takes_value "chip-select GPIO as PORT.PIN (default 0.0)")
		(@arg simulate: -s --simulate "use a simulated EEPROM instead of the device")
		(@arg offload: --offload +takes_value "move data phases through offload channels RX,TX")
		(@arg ("address-bits"): --("address-bits") +takes_value "address width in bits (default 24)")
		(@arg ("page-size"): --("page-size") +takes_value "page size in bytes (default 16)")
		(@arg ("poll-limit"): --("poll-limit") +takes_value "give up after this many busy polls")
		(@subcommand read =>
			(about: "hexdump EEPROM contents")
			(@arg ADDRESS: +required "start address")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand write =>
			(about: "write bytes to the EEPROM")
			(@arg verify: -v --verify "read back and compare after writing")
			(@arg ADDRESS: +required "start address")
			(@arg BYTES: +required +multiple "data bytes (hex)")
		)
		(@subcommand status =>
			(about: "show the status register")
		)
		(@subcommand selftest =>
			(about: "write and verify test patterns (overwrites the first pages)")
		)
	).get_matches();

	let config = build_config(&matches)?;
	let chip_select: ChipSelect = get_optional_param(&matches, "cs")?.unwrap_or(ChipSelect::new(0, 0));

	if matches.is_present("simulate") {
		info!("Using simulated EEPROM ({})", config.geometry);
		let hardware = SimulatedEeprom::new(config.geometry, chip_select)
			.with_write_cycle(SIMULATED_WRITE_CYCLE);
		run(hardware, chip_select, config, &matches)
	} else {
		let path = matches.value_of("device").unwrap_or("/dev/spidev0.0");
		let hardware = linux::open(path)?;
		info!("Using {} with chip-select {} (GPIO {})", hardware.path(), chip_select, linux::gpio_number(chip_select));
		run(hardware, chip_select, config, &matches)
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
