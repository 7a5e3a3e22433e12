//! The device driver registry (spec.md §4.5, §6): a table of driver
//! descriptors by name plus the constructor dispatch behind it.
//! Grounded on `original_source/drivers/device.c` (selection logic) and
//! the per-dongle files it wires together (`uif.c`, `rf2500.c`,
//! `olimex.c`, `olimex_iso.c`, `goodfet.c`). Driver *selection* — which
//! transport to open for a given string name — is a CLI front-end
//! concern; this registry only maps a name to its protocol family so a
//! caller holding an already-open transport can build the right
//! `Device`.

use crate::bsl::{FlashBslDevice, LoadBslDevice, RomBslDevice};
use crate::device::{Device, DeviceArgs};
use crate::error::Result;
use crate::fet::{FetDevice, ProtoFlags};
use crate::hil3::Hil3Device;
use crate::transport::Transport;

/// Which protocol stack a named driver rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Legacy FET command protocol (spec.md §4.6).
    Fet { olimex: bool, proto_flags: ProtoFlags },
    /// HAL/HIL v3 (spec.md §4.7), used by the eZ-FET family.
    Hil3,
    /// ROM bootstrap loader (spec.md §4.4, §4.8).
    RomBsl,
    /// Flash bootstrap loader (spec.md §4.4, §4.8).
    FlashBsl,
    /// USB-HID load-BSL firmware updater (spec.md §4.8).
    LoadBsl,
}

/// One registry entry (spec.md §4.5 "a table of driver descriptors
/// (name, help text, constructor)").
#[derive(Debug, Clone, Copy)]
pub struct DriverInfo {
    pub name: &'static str,
    pub help: &'static str,
    pub requires_tty: bool,
    pub family: Family,
}

/// The full set of named drivers (spec.md §4.5: `uif, uif-bsl, olimex,
/// olimex-v1, olimex-iso, olimex-iso-mk2, rf2500, ezfet, goodfet,
/// rom-bsl, flash-bsl, load-bsl`).
pub static DRIVERS: &[DriverInfo] = &[
    DriverInfo {
        name: "uif",
        help: "TI FET430UIF and compatible devices (legacy FET protocol)",
        requires_tty: true,
        family: Family::Fet {
            olimex: false,
            proto_flags: ProtoFlags::empty(),
        },
    },
    DriverInfo {
        name: "uif-bsl",
        help: "TI FET430UIF BSL firmware update mode",
        requires_tty: true,
        family: Family::LoadBsl,
    },
    DriverInfo {
        name: "olimex",
        help: "Olimex MSP430-JTAG-TINY and compatible devices",
        requires_tty: true,
        family: Family::Fet {
            olimex: true,
            proto_flags: ProtoFlags::NOLEAD_SEND,
        },
    },
    DriverInfo {
        name: "olimex-v1",
        help: "Older Olimex MSP430-JTAG-ISO hardware revision",
        requires_tty: true,
        family: Family::Fet {
            olimex: true,
            proto_flags: ProtoFlags::empty(),
        },
    },
    DriverInfo {
        name: "olimex-iso",
        help: "Olimex MSP430-JTAG-ISO and compatible devices",
        requires_tty: true,
        family: Family::Fet {
            olimex: true,
            proto_flags: ProtoFlags::NOLEAD_SEND,
        },
    },
    DriverInfo {
        name: "olimex-iso-mk2",
        help: "Olimex MSP430-JTAG-ISO-MK2 and compatible devices",
        requires_tty: true,
        family: Family::Fet {
            olimex: true,
            proto_flags: ProtoFlags::NOLEAD_SEND | ProtoFlags::EXTRA_RECV,
        },
    },
    DriverInfo {
        name: "rf2500",
        help: "eZ430-RF2500 and compatible devices",
        requires_tty: false,
        family: Family::Fet {
            olimex: false,
            proto_flags: ProtoFlags::SEPARATE_DATA,
        },
    },
    DriverInfo {
        name: "ezfet",
        help: "eZ-FET and eZ-FET lite on-board debuggers (HAL/HIL v3)",
        requires_tty: false,
        family: Family::Hil3,
    },
    DriverInfo {
        name: "goodfet",
        help: "GoodFET running the MSP430 JTAG firmware",
        requires_tty: true,
        family: Family::Fet {
            olimex: false,
            proto_flags: ProtoFlags::empty(),
        },
    },
    DriverInfo {
        name: "rom-bsl",
        help: "MSP430 ROM bootstrap loader (UART)",
        requires_tty: true,
        family: Family::RomBsl,
    },
    DriverInfo {
        name: "flash-bsl",
        help: "MSP430 flash-resident bootstrap loader (UART)",
        requires_tty: true,
        family: Family::FlashBsl,
    },
    DriverInfo {
        name: "load-bsl",
        help: "USB HID BSL firmware loader/updater",
        requires_tty: false,
        family: Family::LoadBsl,
    },
];

/// Looks up a driver descriptor by name (spec.md §4.5).
pub fn find(name: &str) -> Option<&'static DriverInfo> {
    DRIVERS.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    DRIVERS.iter().map(|d| d.name)
}

/// Builds the `Device` a descriptor names, given an already-open
/// transport. `load-bsl`/`uif-bsl` open with no replacement firmware
/// image configured; callers that have one should construct
/// [`LoadBslDevice::open_with_firmware`] directly instead of going
/// through the registry.
pub fn open<T: Transport + 'static>(
    info: &DriverInfo,
    transport: T,
    args: &DeviceArgs,
) -> Result<Box<dyn Device>> {
    match info.family {
        Family::Fet {
            olimex,
            proto_flags,
        } => {
            let mut dev = FetDevice::new(transport, proto_flags, args.flags, olimex);
            dev.try_open(args)?;
            Ok(Box::new(dev))
        }
        Family::Hil3 => Ok(Box::new(Hil3Device::open(transport, args)?)),
        Family::RomBsl => Ok(Box::new(RomBslDevice::open(transport, args)?)),
        Family::FlashBsl => Ok(Box::new(FlashBslDevice::open(transport, args)?)),
        Family::LoadBsl => Ok(Box::new(LoadBslDevice::open(transport, args)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_spec_named_driver_is_registered() {
        for name in [
            "uif",
            "uif-bsl",
            "olimex",
            "olimex-v1",
            "olimex-iso",
            "olimex-iso-mk2",
            "rf2500",
            "ezfet",
            "goodfet",
            "rom-bsl",
            "flash-bsl",
            "load-bsl",
        ] {
            assert!(find(name).is_some(), "missing driver: {}", name);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(find("RF2500").unwrap().name, "rf2500");
    }

    #[test]
    fn unknown_name_is_absent() {
        assert!(find("nonexistent").is_none());
    }

    #[test]
    fn rf2500_uses_separate_data_quirk() {
        let info = find("rf2500").unwrap();
        assert!(!info.requires_tty);
        match info.family {
            Family::Fet { proto_flags, .. } => {
                assert!(proto_flags.contains(ProtoFlags::SEPARATE_DATA))
            }
            _ => panic!("expected Fet family"),
        }
    }
}
