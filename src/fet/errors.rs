//! TI FET error-code message table (spec.md §4.2, §9): ~100 descriptive
//! strings keyed by the device-reported `error` byte. Purely textual —
//! package it as a static table, not a typed enum, since new dongle
//! firmware can introduce new codes without any behavioral difference
//! here beyond the message shown to the user.

const MESSAGES: &[&str] = &[
    "No error",
    "Could not initialize device interface",
    "Could not close device interface",
    "Invalid parameter(s)",
    "Could not find device or device not supported",
    "Unknown device",
    "Could not read device memory",
    "Could not write device memory",
    "Could not read device configuration fuses",
    "Incorrectly configured device; device derivative not supported",
    "Could not set device Vcc",
    "Could not reset device",
    "Could not preserve/restore device memory",
    "Could not set device operating frequency",
    "Could not erase device memory",
    "Could not set device breakpoint",
    "Could not single step device",
    "Could not run device (to breakpoint)",
    "Could not determine device state",
    "Could not open Enhanced Emulation Module",
    "Could not read Enhanced Emulation Module register",
    "Could not write Enhanced Emulation Module register",
    "Could not close Enhanced Emulation Module",
    "File open error",
    "File type could not be identified",
    "File end error",
    "File input/output error",
    "File data error",
    "Verification error",
    "Could not blow device security fuse",
    "Security fuse has been blown",
    "Error within Intel hex file",
    "Could not write device register",
    "Could not read device register",
    "Not supported by selected interface or interface is not initialized",
    "Interface communication error",
    "No external power supply detected",
    "External power too low",
    "External power detected",
    "External power too high",
    "Hardware self test error",
    "Fast flash routine experienced a timeout",
    "Could not create thread for polling",
    "Could not initialize Enhanced Emulation Module",
    "Insufficent resources",
    "No clock control emulation on connected device",
    "No state storage buffer implemented on connected device",
    "Could not read trace buffer",
    "Enable the variable watch function",
    "No trigger sequencer implemented on connected device",
    "Could not read sequencer state - sequencer is disabled",
    "Could not remove trigger - used in sequencer",
    "Could not set combination - trigger is used in sequencer",
    "System Protection Module A is enabled - device locked",
    "Invalid SPMA key was passed to the target device - device locked",
    "Device does not accept any further SPMA keys - device locked",
    "MSP-FET430UIF Firmware erased - bootloader active",
    "Could not find MSP-FET430UIF on specified COM port",
    "MSP-FET430UIF is already in use",
    "EEM polling thread is already active",
    "Could not terminate EEM polling thread",
    "Could not unlock BSL memory segments",
    "Could not perform access, BSL memory segments are protected",
    "Another device as selected was found",
    "Could not enable JTAG wrong password",
    "Only one UIF must be connected during update to v3",
    "CDC-USB-FET driver was not installed, please install the driver",
    "Manual reboot of USB-FET needed! PLEASE unplug and reconnect your USB-FET!",
    "Internal error",
    "One of the connected eZ-FET debuggers needs recovery",
    "One of the connected eZ-FET debuggers needs recovery",
    "Feature not supported",
    "Only one eZ-FET must be connected during recovery",
    "eZ-FET recovery failed",
    "eZ-FET core(communication layer) update failed",
    "eZ-FET legacy module update failed",
    "Energy Trace is not supported by the selected hardware",
    "Hardware State is unknown",
    "Device configuration data inconsistent. ",
    "EEM module not accessible while running in Ultra Low Power Debug Mode - ",
    "Failed to remove software breakpoints, please reprogram target device",
    "Trigger configuration conflicts with existing triggers",
    "Operation not possible while device is running",
    "This function can not be used when software breakpoints are enabled",
    "JTAG/SBW speed configuration failed",
    "Software breakpoint can't be set (followed by critical value)",
    "EnergyTrace is not supported by selected MSP430 device",
    "EnergyTrace requires Ultra-Low Power debug / LPMx.5 enabled",
    "Legacy version of silicon used, which is no longer supported. ",
    "Secure device via the IDE is not supported. See Device User Guide ",
    "Cycle counter is in basic mode. Set to advanced mode to use this function.",
    "Parallel port FET (MSP-FETP430IF) is no longer supported.",
    "Wrong target architecture was selected. ",
    "Mass erase executed. Please power-cycle your device and restart the debug session.",
    "Your connected hardware might drain too much power from the debugger. ",
    "MSP Tool firmware update failed. Please ensure the USB or Backchannel ",
    "MSP432 devices are not supported using the MSPFET430-UIF",
    "DAP is locked or wrong debug protocol selected.",
    "Device database not loaded.",
    "Invalid error number",
];

/// Looks up the descriptive text for a FET error code. Codes beyond the
/// known table return a generic "unknown error" message rather than
/// panicking — dongle firmware occasionally returns codes newer than
/// this table.
pub fn lookup(code: u8) -> &'static str {
    MESSAGES
        .get(code as usize)
        .copied()
        .unwrap_or("Unknown error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(lookup(0), "No error");
        assert_eq!(lookup(4), "Could not find device or device not supported");
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(lookup(255), "Unknown error");
    }
}
