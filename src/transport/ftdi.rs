//! FTDI serial-over-USB transport (spec.md §4.1).
//!
//! Eight vendor control transfers configure the bridge (reset, 8N1 data,
//! no flow control, modem control, baud divisor, latency timer, purge TX,
//! purge RX); inbound bulk transfers are preceded by a two-byte modem
//! status that must be stripped before the data reaches the caller.

use std::time::Duration;

use rusb::{Direction, Recipient, RequestType};

use crate::error::{TransportError, TransportResult};
use crate::transport::usb_bulk::{UsbBulkTransport, UsbProfile};
use crate::transport::{ModemLines, Transport};

const FTDI_CLOCK: u32 = 3_000_000;

const SIO_RESET: u8 = 0x00;
const SIO_SET_MODEM_CTRL: u8 = 0x01;
const SIO_SET_FLOW_CTRL: u8 = 0x02;
const SIO_SET_BAUDRATE: u8 = 0x03;
const SIO_SET_DATA: u8 = 0x04;
const SIO_SET_LATENCY_TIMER: u8 = 0x09;

const RESET_PURGE_RX: u16 = 1;
const RESET_PURGE_TX: u16 = 2;

const MODEM_DTR_ENABLE: u16 = 0x0101;
const MODEM_RTS_ENABLE: u16 = 0x0202;
const MODEM_DTR_DISABLE: u16 = 0x0100;
const MODEM_RTS_DISABLE: u16 = 0x0200;

/// Number of leading status bytes FTDI prepends to every bulk-in
/// transfer; must be stripped before data reaches the caller.
const MODEM_STATUS_BYTES: usize = 2;

#[derive(Debug)]
pub struct FtdiTransport {
    inner: UsbBulkTransport,
    pending: Vec<u8>,
}

impl FtdiTransport {
    pub fn open(vendor: u16, product: u16, baud_rate: u32) -> TransportResult<Self> {
        let profile = UsbProfile {
            vendor,
            product,
            interface_class: None,
            needs_set_configuration: true,
        };
        let inner = UsbBulkTransport::open(profile)?;
        let mut tr = FtdiTransport {
            inner,
            pending: Vec::new(),
        };
        tr.configure(baud_rate)?;
        Ok(tr)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16) -> TransportResult<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.inner
            .raw_handle_mut()
            .write_control(request_type, request, value, index, &[], Duration::from_millis(300))
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }

    fn configure(&mut self, baud_rate: u32) -> TransportResult<()> {
        self.control_out(SIO_RESET, 0, 0)?;
        self.control_out(SIO_SET_DATA, 8, 0)?;
        self.control_out(SIO_SET_FLOW_CTRL, 0, 0)?;
        self.control_out(SIO_SET_MODEM_CTRL, MODEM_DTR_ENABLE | MODEM_RTS_ENABLE, 0)?;
        let divisor = (FTDI_CLOCK / baud_rate) as u16;
        self.control_out(SIO_SET_BAUDRATE, divisor, 0)?;
        self.control_out(SIO_SET_LATENCY_TIMER, 50, 0)?;
        self.control_out(SIO_RESET, RESET_PURGE_TX, 0)?;
        self.control_out(SIO_RESET, RESET_PURGE_RX, 0)?;
        Ok(())
    }
}

impl Transport for FtdiTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.inner.send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        if self.pending.is_empty() {
            let mut raw = vec![0u8; buf.len() + MODEM_STATUS_BYTES];
            let n = self.inner.recv(&mut raw)?;
            if n <= MODEM_STATUS_BYTES {
                return Err(TransportError::Timeout);
            }
            self.pending.extend_from_slice(&raw[MODEM_STATUS_BYTES..n]);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.pending.clear();
        self.control_out(SIO_RESET, RESET_PURGE_TX, 0)?;
        self.control_out(SIO_RESET, RESET_PURGE_RX, 0)
    }

    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
        let dtr = if lines.contains(ModemLines::DTR) {
            MODEM_DTR_ENABLE
        } else {
            MODEM_DTR_DISABLE
        };
        let rts = if lines.contains(ModemLines::RTS) {
            MODEM_RTS_ENABLE
        } else {
            MODEM_RTS_DISABLE
        };
        self.control_out(SIO_SET_MODEM_CTRL, dtr | rts, 0)
    }
}
