//! Transport layer (spec.md §4.1, L0/L1): uniform framed byte-stream I/O
//! over serial ports, USB bulk endpoints, HID, and CDC-ACM interfaces.
//!
//! Every [`Transport`] implementation must uphold the invariants from
//! spec.md §3: `recv` returns at least one byte or fails (a timeout is an
//! error, never a zero-length success), `send` transfers all bytes or
//! fails, and after `flush` the receive side contains no buffered data.

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

use crate::error::TransportResult;

pub mod cdc_acm;
pub mod cp210x;
pub mod ftdi;
pub mod hid;
pub mod serial;
pub mod ti3410;
pub mod usb_bulk;

bitflags! {
    /// Modem control lines a transport can drive (spec.md §3).
    pub struct ModemLines: u8 {
        const DTR = 0x01;
        const RTS = 0x02;
    }
}

/// Default read timeout for kernel serial ports (spec.md §4.1).
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for libusb-backed transports (spec.md §4.1).
pub const USB_TIMEOUT: Duration = Duration::from_secs(30);

/// A capability object exposing uniform framed byte-stream I/O (spec.md
/// §3 "Transport").
///
/// `suspend`/`resume` default to no-ops; only transports that need to
/// release a libusb reference across a device reset (spec.md §4.1's
/// "eventless suspend/resume") override them.
pub trait Transport: fmt::Debug {
    /// Transfers all of `data` or fails; never a partial write.
    fn send(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Reads up to `buf.len()` bytes, returning the number read. Must
    /// return at least one byte within the transport's read timeout, or
    /// fail — a timeout is an error, never a zero-length success.
    fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize>;

    /// Discards any buffered inbound bytes.
    fn flush(&mut self) -> TransportResult<()>;

    /// Sets the modem control lines (DTR/RTS), used by BSL entry
    /// sequences and reset strobing.
    fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()>;

    /// Releases bus references ahead of an impending device reset.
    fn suspend(&mut self) -> TransportResult<()> {
        Ok(())
    }

    /// Reattaches after a device reset completed by the caller.
    fn resume(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory transport used by upper-layer protocol tests: `inbox`
    /// holds canned reply bytes to hand back from `recv`, `outbox`
    /// accumulates everything written via `send`.
    #[derive(Debug, Default)]
    pub struct LoopbackTransport {
        pub inbox: VecDeque<u8>,
        pub outbox: Vec<u8>,
        pub modem: ModemLines,
    }

    impl LoopbackTransport {
        pub fn with_reply(bytes: &[u8]) -> Self {
            LoopbackTransport {
                inbox: bytes.iter().copied().collect(),
                outbox: Vec::new(),
                modem: ModemLines::empty(),
            }
        }

        pub fn queue(&mut self, bytes: &[u8]) {
            self.inbox.extend(bytes.iter().copied());
        }
    }

    impl Transport for LoopbackTransport {
        fn send(&mut self, data: &[u8]) -> TransportResult<()> {
            self.outbox.extend_from_slice(data);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
            if self.inbox.is_empty() {
                return Err(crate::error::TransportError::Timeout);
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbox.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn flush(&mut self) -> TransportResult<()> {
            self.inbox.clear();
            Ok(())
        }

        fn set_modem(&mut self, lines: ModemLines) -> TransportResult<()> {
            self.modem = lines;
            Ok(())
        }
    }
}
