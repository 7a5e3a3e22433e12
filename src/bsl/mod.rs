//! Bootstrap-loader framing and drivers (spec.md §4.4, §4.8, L2c/L3):
//! ROM-BSL and flash-BSL, both rate-limited serial links in parity-even
//! 9600-baud mode, the USB-HID load-BSL firmware loader, plus the
//! entry/exit sequence mini-language the serial variants share.
//!
//! Grounded on `original_source/drivers/rom_bsl.c`,
//! `drivers/flash_bsl.c`, `drivers/bsllib.c` and `drivers/loadbsl.c`.

pub mod flash;
pub mod load;
pub mod rom;
pub mod seq;

pub use flash::FlashBslDevice;
pub use load::{FirmwareImage, LoadBslDevice};
pub use rom::RomBslDevice;

/// Default entry sequence for ROM-BSL (`rom_bsl_open`'s fallback).
pub const ROM_DEFAULT_SEQ: &str = "DR,r,R,r,d,R:DR,r";
/// Default entry sequence for flash-BSL (`flash_bsl_open`'s fallback).
pub const FLASH_DEFAULT_SEQ: &str = "dR,r,R,r,R,D:dR,DR";
