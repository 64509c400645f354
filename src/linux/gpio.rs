use std::fs;
use std::io::{
	self,
	Write,
};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::hardware::{
	ChipSelect,
	Level,
};

const GPIO_ROOT: &str = "/sys/class/gpio";
const PINS_PER_PORT: u32 = 32;

/// sysfs GPIO number for `port.pin`
pub fn gpio_number(chip_select: ChipSelect) -> u32 {
	u32::from(chip_select.port) * PINS_PER_PORT + u32::from(chip_select.pin)
}

/// GPIO output through its sysfs value file.
pub struct GpioOutput {
	value: fs::File,
	number: u32,
}

impl GpioOutput {
	pub fn number(&self) -> u32 {
		self.number
	}

	pub fn set(&mut self, level: Level) -> io::Result<()> {
		let data: &[u8] = match level {
			Level::Low => b"0",
			Level::High => b"1",
		};
		// writing should push all data in one step (in this case)
		let l = self.value.write_at(data, 0)?;
		if l != data.len() {
			return Err(io::Error::new(io::ErrorKind::Other, "failed to write GPIO value"));
		}
		Ok(())
	}
}

fn write_attribute(path: &Path, data: &str) -> io::Result<()> {
	fs::OpenOptions::new().write(true).open(path)?.write_all(data.as_bytes())
}

/// Export the line if needed and make it an output, released (high).
pub fn open_output(chip_select: ChipSelect) -> crate::AResult<GpioOutput> {
	let number = gpio_number(chip_select);
	with_context!(("chip-select {} (GPIO {})", chip_select, number), {
		let dir = Path::new(GPIO_ROOT).join(format!("gpio{}", number));
		if !dir.exists() {
			debug!("Exporting GPIO {}", number);
			write_attribute(&Path::new(GPIO_ROOT).join("export"), &number.to_string())?;
		}
		// "high" sets direction and level in one step, no glitch to low
		write_attribute(&dir.join("direction"), "high")?;

		let value = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.open(dir.join("value"))?;

		Ok(GpioOutput { value, number })
	})
}
