//! A protocol stack and device abstraction layer for MSP430 JTAG/SBW/BSL
//! debug probes.
//!
//! This crate implements the host side of several proprietary and
//! semi-documented serial/USB protocols used by MSP430 debug dongles
//! (TI's legacy FET protocol, the newer HAL/HIL-v3 protocol used by eZ-FET
//! probes, and the ROM/flash bootstrap-loader protocols) behind a single
//! polymorphic [`device::Device`] trait. Callers attach to a target,
//! read/write its memory and registers, control execution, program its
//! flash, and identify the chip without needing to know which dongle or
//! wire protocol is in use.
//!
//! File-format decoding, disassembly, symbol tables, and the interactive
//! command shell are not part of this crate; it only consumes and
//! produces raw `(address, bytes)` data.

#![warn(missing_debug_implementations, rust_2018_idioms)]

#[macro_use]
extern crate log;

pub mod address;
pub mod error;

pub mod transport;

pub mod fet;
pub mod hal;
pub mod bsl;
pub mod hil3;

pub mod chipinfo;
pub mod breakpoint;
pub mod powerbuf;
pub mod btree;
pub mod symtab;

pub mod device;

pub use crate::address::{Address, ADDRESS_NONE};
pub use crate::error::{CoreError, TransportError};
pub use crate::device::{Device, DeviceArgs};
