//! Device layer (spec.md §4.5, L4): the polymorphic `Device` trait,
//! its configuration struct, and the driver registry, grounded on
//! `original_source/drivers/device.h` (`struct device_class`, `struct
//! device_args`) and `util/usbutil.c`'s VID/PID table.

pub mod registry;

use bitflags::bitflags;

use crate::breakpoint::BreakType;
use crate::error::Result;

/// Number of general-purpose registers a `Device` exposes (spec.md §3).
pub const NUM_REGS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtlOp {
    Reset,
    Run,
    Halt,
    Step,
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Halted,
    Running,
    Intr,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseKind {
    All,
    Main,
    Segment,
}

bitflags! {
    /// Construction-time flags (spec.md §4.0, `device_args.flags`).
    pub struct DeviceFlags: u32 {
        /// Default is Spy-Bi-Wire.
        const JTAG         = 0x01;
        const LONG_PW      = 0x02;
        /// Default is USB.
        const TTY          = 0x04;
        const FORCE_RESET  = 0x08;
        const DO_FWUPDATE  = 0x10;
        const SKIP_CLOSE   = 0x20;
    }
}

/// Driver construction parameters (spec.md §4.0), mirroring
/// `original_source/drivers/device.h`'s `struct device_args`.
#[derive(Debug, Clone, Default)]
pub struct DeviceArgs {
    pub flags: DeviceFlags,
    pub vcc_mv: Option<u32>,
    pub path: Option<String>,
    pub forced_chip_id: Option<String>,
    pub requested_serial: Option<String>,
    pub require_fwupdate: Option<String>,
    pub bsl_entry_seq: Option<String>,
    pub bsl_gpio_rts: Option<u32>,
    pub bsl_gpio_dtr: Option<u32>,
}

impl DeviceArgs {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The polymorphic device abstraction (spec.md §3 "Device", §4.5).
///
/// A driver owns its transport exclusively; the registry in
/// [`registry`] maps driver names to constructors returning
/// `Box<dyn Device>`.
pub trait Device: std::fmt::Debug {
    /// Reads up to `buf.len()` bytes starting at `addr`, returning the
    /// number actually read (short reads are permitted at region
    /// boundaries; callers must loop).
    fn readmem(&mut self, addr: crate::Address, buf: &mut [u8]) -> Result<usize>;

    /// Writes `data`, returning the number of bytes actually written.
    fn writemem(&mut self, addr: crate::Address, data: &[u8]) -> Result<usize>;

    fn erase(&mut self, kind: EraseKind, addr: crate::Address) -> Result<()>;

    fn getregs(&mut self) -> Result<[u32; NUM_REGS]>;

    fn setregs(&mut self, regs: &[u32; NUM_REGS]) -> Result<()>;

    fn ctl(&mut self, op: CtlOp) -> Result<()>;

    fn poll(&mut self) -> Result<Status>;

    /// Attempts a final reset/close. A driver flag may skip this.
    fn destroy(&mut self);

    /// Reads the configuration fuse byte(s), if the driver supports it.
    fn getconfigfuses(&mut self) -> Result<u8> {
        Err(crate::error::CoreError::semantic(
            "getconfigfuses not supported by this driver",
        ))
    }

    /// Sets or clears a breakpoint slot (spec.md §4.10). The default
    /// implementation rejects breakpoints for drivers (BSL-class) that
    /// don't support them; HIL v3/FET drivers override this to route
    /// through their [`crate::breakpoint::BreakpointTable`].
    fn setbrk(
        &mut self,
        _which: Option<usize>,
        _enabled: bool,
        _addr: crate::Address,
        _bp_type: BreakType,
    ) -> Result<Option<usize>> {
        Err(crate::error::CoreError::semantic(
            "breakpoints not supported by this driver",
        ))
    }
}
