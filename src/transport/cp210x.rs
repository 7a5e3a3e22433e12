//! CP210x serial-over-USB transport (spec.md §4.1).
//!
//! Three vendor control transfers bring the chip into a UART bridge
//! state: enable UART, set the baud divisor, then assert DTR+RTS. Data
//! afterwards flows over a plain bulk IN/OUT pair, so this wraps a
//! [`UsbBulkTransport`] rather than reimplementing bulk I/O.

use std::time::Duration;

use rusb::{Direction, Recipient, RequestType};

use crate::error::{TransportError, TransportResult};
use crate::transport::usb_bulk::{UsbBulkTransport, UsbProfile};
use crate::transport::{ModemLines, Transport};

const CP210X_CLOCK: u32 = 3_500_000;

const IFC_ENABLE: u8 = 0x00;
const SET_BAUDDIV: u8 = 0x01;
const SET_MHS: u8 = 0x07;

const DTR: u16 = 0x0001;
const RTS: u16 = 0x0002;
const WRITE_DTR: u16 = 0x0100;
const WRITE_RTS: u16 = 0x0200;

#[derive(Debug)]
pub struct Cp210xTransport {
    inner: UsbBulkTransport,
}

impl Cp210xTransport {
    pub fn open(vendor: u16, product: u16, baud_rate: u32) -> TransportResult<Self> {
        let profile = UsbProfile {
            vendor,
            product,
            interface_class: Some(255),
            needs_set_configuration: false,
        };
        let inner = UsbBulkTransport::open(profile)?;
        let mut tr = Cp210xTransport { inner };
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
        self.control_out(IFC_ENABLE, 0x1, 0)?;
        let divisor = (CP210X_CLOCK / baud_rate) as u16;
        self.control_out(SET_BAUDDIV, divisor, 0)?;
        self.control_out(SET_MHS, WRITE_DTR | WRITE_RTS | DTR | RTS, 0)?;
        Ok(())
    }
}

impl Transport for Cp210xTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.inner.send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.inner.recv(buf)
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.inner.flush()
    }

    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
        let mut bits = WRITE_DTR | WRITE_RTS;
        if lines.contains(ModemLines::DTR) {
            bits |= DTR;
        }
        if lines.contains(ModemLines::RTS) {
            bits |= RTS;
        }
        self.control_out(SET_MHS, bits, 0)
    }
}
