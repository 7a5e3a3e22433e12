//! TI 3410 serial-over-USB transport (spec.md §4.1).
//!
//! The TI3410 bridge (used by the MSP-FET430UIF) ships in two USB
//! configurations. The "boot" configuration requires downloading a
//! signed firmware image before the device re-enumerates in its
//! "active" configuration, which exposes one bulk-in, one bulk-out, and
//! one interrupt endpoint and needs its own open/start/purge dance.

use std::time::Duration;

use rusb::{Direction, Recipient, RequestType};

use crate::error::{TransportError, TransportResult};
use crate::transport::usb_bulk::{UsbBulkTransport, UsbProfile};
use crate::transport::{ModemLines, Transport};

const TI_BOOT_CONFIG: u8 = 1;
const TI_ACTIVE_CONFIG: u8 = 2;

const TI_OPEN_PORT: u8 = 0x06;
const TI_START_PORT: u8 = 0x08;
const TI_PURGE_PORT: u8 = 0x0b;
const TI_WRITE_DATA: u8 = 0x80;

const TI_PURGE_OUTPUT: u16 = 0x00;
const TI_PURGE_INPUT: u16 = 0x80;

const TI_MCR_LOOP: u8 = 0x04;
const TI_MCR_DTR: u8 = 0x10;
const TI_MCR_RTS: u8 = 0x20;
const TI_RW_DATA_ADDR_XDATA: u8 = 0x30;

const MCR_TARGET_ADDR: u16 = 0xffa4;
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(2);
const DOWNLOAD_MAX_PACKET: usize = 64;

#[derive(Debug)]
pub struct Ti3410Transport {
    inner: UsbBulkTransport,
}

impl Ti3410Transport {
    /// Opens the device, downloading `firmware` (an unsigned byte
    /// payload, typically decoded from an Intel-HEX image by the
    /// caller) into the boot configuration if the device hasn't already
    /// re-enumerated into the active configuration.
    pub fn open(vendor: u16, product: u16, firmware: Option<&[u8]>) -> TransportResult<Self> {
        let profile = UsbProfile {
            vendor,
            product,
            interface_class: None,
            needs_set_configuration: false,
        };
        let mut inner = UsbBulkTransport::open(profile)?;

        if let Some(fw) = firmware {
            Self::download_firmware(&mut inner, fw)?;
            std::thread::sleep(Duration::from_secs(2));
            inner = UsbBulkTransport::open(UsbProfile {
                vendor,
                product,
                interface_class: None,
                needs_set_configuration: true,
            })?;
        }

        let mut tr = Ti3410Transport { inner };
        tr.init_port()?;
        Ok(tr)
    }

    /// Prepends a 3-byte header `(size_lo, size_hi, checksum)` where
    /// `checksum` is the unsigned byte-sum of `firmware`, then writes the
    /// image in `DOWNLOAD_MAX_PACKET`-sized chunks.
    fn download_firmware(inner: &mut UsbBulkTransport, firmware: &[u8]) -> TransportResult<()> {
        let checksum = firmware.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        let mut image = Vec::with_capacity(firmware.len() + 3);
        image.push((firmware.len() & 0xff) as u8);
        image.push((firmware.len() >> 8) as u8);
        image.push(checksum);
        image.extend_from_slice(firmware);

        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        for chunk in image.chunks(DOWNLOAD_MAX_PACKET) {
            inner
                .raw_handle_mut()
                .write_control(request_type, TI_WRITE_DATA, 0, 0, chunk, TRANSFER_TIMEOUT)
                .map_err(|e| TransportError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn control_out_class(&mut self, request: u8, value: u16, index: u16) -> TransportResult<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.inner
            .raw_handle_mut()
            .write_control(request_type, request, value, index, &[], TRANSFER_TIMEOUT)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }

    /// `termios` setup -> MCR write -> open port -> start port -> purge
    /// both directions -> clear halts -> re-open/start, per spec.md.
    fn init_port(&mut self) -> TransportResult<()> {
        self.write_mcr(TI_MCR_DTR | TI_MCR_RTS | TI_MCR_LOOP)?;
        self.control_out_class(TI_OPEN_PORT, 0, 0)?;
        self.control_out_class(TI_START_PORT, 0, 0)?;
        self.control_out_class(TI_PURGE_PORT, TI_PURGE_OUTPUT, 0)?;
        self.control_out_class(TI_PURGE_PORT, TI_PURGE_INPUT, 0)?;
        self.control_out_class(TI_OPEN_PORT, 0, 0)?;
        self.control_out_class(TI_START_PORT, 0, 0)?;
        Ok(())
    }

    /// Writes the modem control register to the bridge's internal target
    /// RAM address, per the original's `(DTR+RTS+LOOP write to target
    /// RAM address)` init sequence.
    fn write_mcr(&mut self, bits: u8) -> TransportResult<()> {
        let value = ((TI_RW_DATA_ADDR_XDATA as u16) << 8) | bits as u16;
        self.control_out_class(TI_WRITE_DATA, value, MCR_TARGET_ADDR)
    }
}

impl Transport for Ti3410Transport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.inner.send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.inner.recv(buf)
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.control_out_class(TI_PURGE_PORT, TI_PURGE_OUTPUT, 0)?;
        self.control_out_class(TI_PURGE_PORT, TI_PURGE_INPUT, 0)?;
        self.inner.flush()
    }

    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
        let mut bits = TI_MCR_LOOP;
        if lines.contains(ModemLines::DTR) {
            bits |= TI_MCR_DTR;
        }
        if lines.contains(ModemLines::RTS) {
            bits |= TI_MCR_RTS;
        }
        self.write_mcr(bits)
    }
}
