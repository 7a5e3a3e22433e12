//! CDC-ACM transport (spec.md §4.1, §9): a USB Communications Device
//! Class ACM interface, used by eZ-FET and some load-BSL targets that
//! expose a virtual serial port directly over bulk endpoints rather than
//! through a native OS serial driver.

use crate::error::TransportResult;
use crate::transport::usb_bulk::{UsbBulkTransport, UsbProfile};
use crate::transport::{ModemLines, Transport};

const CDC_ACM_DATA_CLASS: u8 = 0x0a;

#[derive(Debug)]
pub struct CdcAcmTransport {
    inner: UsbBulkTransport,
}

impl CdcAcmTransport {
    pub fn open(vendor: u16, product: u16) -> TransportResult<Self> {
        let profile = UsbProfile {
            vendor,
            product,
            interface_class: Some(CDC_ACM_DATA_CLASS),
            needs_set_configuration: false,
        };
        Ok(CdcAcmTransport {
            inner: UsbBulkTransport::open(profile)?,
        })
    }
}

impl Transport for CdcAcmTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.inner.send(data)
    }

    /// Per spec.md §9: any bulk-transfer error on this path is a hard
    /// failure. The original C driver stored a negative length into a
    /// declared-`int` length field on error; `Result`'s `Err` arm makes
    /// that representation structurally impossible here, so no
    /// buffer-state invalidation is needed beyond propagating the error.
    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.inner.recv(buf)
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.inner.flush()
    }

    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
        self.inner.set_modem(lines)
    }

    fn suspend(&mut self) -> TransportResult<()> {
        self.inner.suspend()
    }

    fn resume(&mut self) -> TransportResult<()> {
        self.inner.resume()
    }
}
