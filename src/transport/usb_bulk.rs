//! Generic libusb bulk-endpoint transport (spec.md §4.1 "Libusb bulk").
//!
//! Each dongle variant (Olimex JTAG-TINY/ISO/ISO-MK2, etc.) enumerates the
//! first interface matching a USB device class and picks the first
//! IN/OUT bulk endpoint on it. Built on `rusb`.

use std::time::Duration;

use rusb::{DeviceHandle, GlobalContext};

use crate::error::{TransportError, TransportResult};
use crate::transport::{ModemLines, Transport, USB_TIMEOUT};

/// A USB vendor/product/class profile identifying one dongle variant.
#[derive(Debug, Clone, Copy)]
pub struct UsbProfile {
    pub vendor: u16,
    pub product: u16,
    /// The bInterfaceClass to match when picking the interface; `None`
    /// matches the first interface regardless of class.
    pub interface_class: Option<u8>,
    /// Issue an explicit `set_configuration` before `claim_interface`
    /// (some devices require it; others reject it if already configured).
    pub needs_set_configuration: bool,
}

/// A bulk-endpoint USB transport claimed from a [`UsbProfile`].
#[derive(Debug)]
pub struct UsbBulkTransport {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    in_ep: u8,
    out_ep: u8,
    timeout: Duration,
    /// Set across `suspend`/`resume` so IO methods can refuse to run.
    suspended: bool,
}

impl UsbBulkTransport {
    pub fn open(profile: UsbProfile) -> TransportResult<Self> {
        let devices = rusb::devices().map_err(|e| TransportError::Io(e.to_string()))?;

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if desc.vendor_id() != profile.vendor || desc.product_id() != profile.product {
                continue;
            }

            let config = device
                .active_config_descriptor()
                .or_else(|_| device.config_descriptor(0))
                .map_err(|e| TransportError::Io(e.to_string()))?;

            let iface = config.interfaces().find(|iface| {
                iface.descriptors().any(|d| {
                    profile
                        .interface_class
                        .map_or(true, |c| d.class_code() == c)
                })
            });
            let Some(iface) = iface else { continue };
            let iface_number = iface.number();
            let descriptor = iface
                .descriptors()
                .next()
                .ok_or_else(|| TransportError::Io("no interface descriptor".into()))?;

            let mut in_ep = None;
            let mut out_ep = None;
            for ep in descriptor.endpoint_descriptors() {
                match ep.direction() {
                    rusb::Direction::In if in_ep.is_none() => in_ep = Some(ep.address()),
                    rusb::Direction::Out if out_ep.is_none() => out_ep = Some(ep.address()),
                    _ => {}
                }
            }
            let (Some(in_ep), Some(out_ep)) = (in_ep, out_ep) else {
                continue;
            };

            let mut handle = device
                .open()
                .map_err(|e| TransportError::Io(e.to_string()))?;

            if profile.needs_set_configuration {
                let _ = handle.set_active_configuration(config.number());
            }

            #[cfg(target_os = "linux")]
            {
                if handle.kernel_driver_active(iface_number).unwrap_or(false) {
                    handle
                        .detach_kernel_driver(iface_number)
                        .map_err(|e| TransportError::Io(e.to_string()))?;
                }
            }

            handle
                .claim_interface(iface_number)
                .map_err(|e| TransportError::Io(e.to_string()))?;

            let mut tr = UsbBulkTransport {
                handle,
                interface: iface_number,
                in_ep,
                out_ep,
                timeout: USB_TIMEOUT,
                suspended: false,
            };
            tr.drain_lingering()?;
            return Ok(tr);
        }

        Err(TransportError::Io(format!(
            "no matching USB device found ({:04x}:{:04x})",
            profile.vendor, profile.product
        )))
    }

    /// Lingering data from a previous session is drained after claiming
    /// the interface (spec.md §4.1).
    fn drain_lingering(&mut self) -> TransportResult<()> {
        let mut scratch = [0u8; 64];
        loop {
            match self
                .handle
                .read_bulk(self.in_ep, &mut scratch, Duration::from_millis(50))
            {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        Ok(())
    }

    /// Exposes the raw handle so vendor-specific wrappers (CP210x, FTDI)
    /// can issue their own control transfers ahead of bulk I/O.
    pub(crate) fn raw_handle_mut(&mut self) -> &mut DeviceHandle<GlobalContext> {
        &mut self.handle
    }

    fn check_suspended(&self) -> TransportResult<()> {
        if self.suspended {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for UsbBulkTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.check_suspended()?;
        let written = self
            .handle
            .write_bulk(self.out_ep, data, self.timeout)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if written != data.len() {
            return Err(TransportError::Io("short USB write".into()));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.check_suspended()?;
        match self.handle.read_bulk(self.in_ep, buf, self.timeout) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.check_suspended()?;
        self.drain_lingering()
    }

    fn set_modem(&mut self, _lines: ModemLines) -> TransportResult<()> {
        // Bulk dongles have no modem control lines; JTAG/SBW reset is
        // driven by protocol commands instead.
        Ok(())
    }

    fn suspend(&mut self) -> TransportResult<()> {
        self.handle
            .release_interface(self.interface)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> TransportResult<()> {
        self.handle
            .claim_interface(self.interface)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.suspended = false;
        Ok(())
    }
}
