//! USB-HID transport (spec.md §4.1 "BSL-HID"): a fixed 64-byte report,
//! `(0x3F, len, data[len], pad 0xac)`, used to talk to the load-BSL
//! bootloader on 5xx/6xx USB devices. Built on `hidapi`.

use hidapi::{HidApi, HidDevice};

use crate::error::{TransportError, TransportResult};
use crate::transport::{ModemLines, Transport};

const REPORT_SIZE: usize = 64;
const REPORT_HEADER: u8 = 0x3f;
const REPORT_PAD: u8 = 0xac;
const MTU: usize = REPORT_SIZE - 2;

#[derive(Debug)]
pub struct HidTransport {
    device: HidDevice,
    /// Bytes already delivered from the last HID report that weren't
    /// consumed by the caller's `recv` buffer.
    pending: Vec<u8>,
}

impl HidTransport {
    pub fn open(vendor: u16, product: u16) -> TransportResult<Self> {
        let api = HidApi::new().map_err(|e| TransportError::Io(e.to_string()))?;
        let device = api
            .open(vendor, product)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(HidTransport {
            device,
            pending: Vec::new(),
        })
    }

    pub fn max_payload() -> usize {
        MTU
    }
}

impl Transport for HidTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        if data.len() > MTU {
            return Err(TransportError::Protocol(format!(
                "HID report payload too large: {} > {}",
                data.len(),
                MTU
            )));
        }
        let mut report = [0u8; REPORT_SIZE + 1];
        // hidapi expects a leading report-ID byte (0 = none) before the
        // fixed HID report itself.
        report[1] = REPORT_HEADER;
        report[2] = data.len() as u8;
        report[3..3 + data.len()].copy_from_slice(data);
        for b in report[3 + data.len()..].iter_mut() {
            *b = REPORT_PAD;
        }
        self.device
            .write(&report)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        if self.pending.is_empty() {
            let mut report = [0u8; REPORT_SIZE];
            let n = self
                .device
                .read_timeout(&mut report, 5000)
                .map_err(|e| TransportError::Io(e.to_string()))?;
            if n == 0 {
                return Err(TransportError::Timeout);
            }
            if report[0] != REPORT_HEADER {
                return Err(TransportError::Protocol(format!(
                    "bad HID report header 0x{:02x}",
                    report[0]
                )));
            }
            let len = report[1] as usize;
            self.pending
                .extend_from_slice(&report[2..2 + len.min(MTU)]);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.pending.clear();
        Ok(())
    }

    fn set_modem(&mut self, _lines: ModemLines) -> TransportResult<()> {
        Ok(())
    }
}
