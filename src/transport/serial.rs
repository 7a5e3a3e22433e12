//! Native serial port transport (spec.md §4.1 "Native serial").
//!
//! Raw 8N1, optional even parity, arbitrary baud rate. Built on the
//! `serialport` crate, the same crate family the rest of the transport
//! layer leans on for anything that isn't a raw libusb/hidapi device.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{TransportError, TransportResult};
use crate::transport::{ModemLines, Transport, SERIAL_TIMEOUT};

/// Parity mode for [`SerialTransport::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialParity {
    None,
    Even,
}

/// A native serial port, opened 8N1 (or 8E1) at an arbitrary baud rate.
#[derive(Debug)]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32, parity: SerialParity) -> TransportResult<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(match parity {
                SerialParity::None => Parity::None,
                SerialParity::Even => Parity::Even,
            })
            .flow_control(FlowControl::None)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(SerialTransport { port })
    }

    /// Some adapters (FET-family dongles with custom USB-serial bridges)
    /// need a non-standard baud divisor; this reopens the same device
    /// path at a caller-chosen rate, following the original's per-driver
    /// custom-divisor handling.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> TransportResult<()> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
        self.port
            .write_data_terminal_ready(lines.contains(ModemLines::DTR))
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.port
            .write_request_to_send(lines.contains(ModemLines::RTS))
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
