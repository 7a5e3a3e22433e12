//! Flash-BSL: the generic TI flash-resident bootstrap loader, using
//! CRC-CCITT-checksummed packets over the same parity-even 9600-baud
//! serial link as ROM-BSL. Grounded on
//! `original_source/drivers/flash_bsl.c`.
//!
//! The CRC is TI's published BSL CRC-CCITT, algorithmically identical
//! to the FET legacy protocol's table-driven CRC-16-CCITT (both pass
//! the same three self-test vectors from spec.md §8 scenario 6), so
//! this module reuses [`crate::fet::proto::crc_ccitt`] rather than
//! reimplementing the shift-based variant from the original source.

use crate::bsl::seq::{self, GpioPins};
use crate::bsl::FLASH_DEFAULT_SEQ;
use crate::breakpoint::BreakType;
use crate::device::{CtlOp, Device, DeviceArgs, DeviceFlags, EraseKind, Status, NUM_REGS};
use crate::error::{CoreError, Result};
use crate::fet::proto::crc_ccitt;
use crate::transport::Transport;
use crate::Address;

const MAX_BLOCK: usize = 256;
const MAX_PACKET: usize = 512;

const RX_DATA_BLOCK: u8 = 0x10;
const RX_PASSWORD: u8 = 0x11;
const ERASE_SEGMENT: u8 = 0x12;
const MASS_ERASE: u8 = 0x15;
const TX_DATA_BLOCK: u8 = 0x18;
const TX_BSL_VERSION: u8 = 0x19;

const TAG_DATA: u8 = 0x3a;
const TAG_STATUS: u8 = 0x3b;

const LONG_PASSWORD: [u8; 33] = {
    let mut p = [0xffu8; 33];
    p[0] = RX_PASSWORD;
    p
};
const SHORT_PASSWORD: [u8; 17] = {
    let mut p = [0xffu8; 17];
    p[0] = RX_PASSWORD;
    p
};

fn status_message(code: u8) -> &'static str {
    match code {
        0x00 => "success",
        0x01 => "FLASH verify failed",
        0x02 => "FLASH operation failed",
        0x03 => "voltage not constant during program",
        0x04 => "BSL is locked",
        0x05 => "incorrect password",
        0x06 => "attempted byte write to FLASH",
        0x07 => "unrecognized command",
        0x08 => "command was too long",
        _ => "unknown status message",
    }
}

/// Framing/transport glue for flash-BSL (spec.md §4.4).
#[derive(Debug)]
pub struct FlashBslProto<T: Transport> {
    transport: T,
}

impl<T: Transport> FlashBslProto<T> {
    pub fn new(transport: T) -> Self {
        FlashBslProto { transport }
    }

    /// Frames and sends `data`, then reads the single-byte ACK/error
    /// response (mirrors `flash_bsl_send`).
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PACKET {
            return Err(CoreError::semantic("flash-bsl: outbound packet too long"));
        }
        let crc = crc_ccitt(data);
        let mut pkt = Vec::with_capacity(data.len() + 5);
        pkt.push(0x80);
        pkt.push((data.len() & 0xff) as u8);
        pkt.push(((data.len() >> 8) & 0xff) as u8);
        pkt.extend_from_slice(data);
        pkt.push((crc & 0xff) as u8);
        pkt.push((crc >> 8) as u8);

        self.transport.send(&pkt)?;

        let mut resp = [0u8; 1];
        self.transport.recv(&mut resp)?;
        if resp[0] != 0 {
            return Err(CoreError::framing(format!(
                "flash-bsl: {}",
                status_message(resp[0])
            )));
        }
        Ok(())
    }

    /// Reads a framed reply: 3-byte header, payload, 2-byte CRC
    /// (mirrors `flash_bsl_recv`).
    fn recv(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 3];
        self.recv_exact(&mut header)?;
        if header[0] != 0x80 {
            return Err(CoreError::framing("flash-bsl: incorrect response header"));
        }
        let len = u16::from_le_bytes([header[1], header[2]]) as usize;

        let mut payload = vec![0u8; len];
        self.recv_exact(&mut payload)?;

        let mut crc_bytes = [0u8; 2];
        self.recv_exact(&mut crc_bytes)?;
        let crc_value = u16::from_le_bytes(crc_bytes);
        if crc_ccitt(&payload) != crc_value {
            return Err(CoreError::framing("flash-bsl: received message with bad CRC"));
        }

        std::thread::sleep(std::time::Duration::from_millis(10));
        Ok(payload)
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.transport.recv(&mut buf[done..])?;
            done += n;
        }
        Ok(())
    }
}

/// The flash-BSL [`Device`] (spec.md §4.8): same register/ctl/poll
/// behavior as ROM-BSL, a different command set and CRC framing.
#[derive(Debug)]
pub struct FlashBslDevice<T: Transport> {
    proto: FlashBslProto<T>,
    long_password: bool,
}

impl<T: Transport> FlashBslDevice<T> {
    pub fn open(transport: T, args: &DeviceArgs) -> Result<Self> {
        let mut proto = FlashBslProto::new(transport);
        let seq_str = args.bsl_entry_seq.as_deref().unwrap_or(FLASH_DEFAULT_SEQ);
        let (entry, _exit) = seq::split(seq_str);

        match (args.bsl_gpio_rts, args.bsl_gpio_dtr) {
            (Some(rts), Some(dtr)) => GpioPins { rts, dtr }.run(entry)?,
            _ => seq::run_serial(&mut proto.transport, entry)?,
        }

        std::thread::sleep(std::time::Duration::from_millis(500));

        let long_password = args.flags.contains(DeviceFlags::LONG_PW);
        let mut dev = FlashBslDevice { proto, long_password };
        dev.unlock()?;

        dev.proto.send(&[TX_BSL_VERSION])?;
        let version = dev.proto.recv()?;
        if version.len() < 5 {
            return Err(CoreError::framing("flash-bsl: BSL responded with invalid version"));
        }
        debug!("flash-bsl version {:02x?}", version);

        Ok(dev)
    }

    fn unlock(&mut self) -> Result<()> {
        if let Err(e) = self.erase(EraseKind::Main, Address::new(0)) {
            warn!("flash-bsl: warning: erase failed: {}", e);
        }

        let password: &[u8] = if self.long_password { &LONG_PASSWORD } else { &SHORT_PASSWORD };
        self.proto.send(password)?;
        let resp = self.proto.recv()?;
        check_status(&resp, "flash-bsl: password error")
    }
}

fn check_status(resp: &[u8], context: &str) -> Result<()> {
    if resp.len() < 2 {
        return Err(CoreError::framing(format!("{}: response too short", context)));
    }
    if resp[0] != TAG_STATUS {
        return Err(CoreError::framing(format!("{}: invalid response tag", context)));
    }
    if resp[1] != 0 {
        return Err(CoreError::framing(format!("{}: {}", context, status_message(resp[1]))));
    }
    Ok(())
}

impl<T: Transport> Device for FlashBslDevice<T> {
    fn readmem(&mut self, addr: Address, buf: &mut [u8]) -> Result<usize> {
        let a0 = addr.raw();
        let len = buf.len() as u32;
        if a0 > 0xfffff || a0 + len > 0x100000 {
            return Err(CoreError::semantic("flash-bsl: read exceeds possible range"));
        }

        let mut done = 0usize;
        while done < buf.len() {
            let a = a0 + done as u32;
            let read_size = (buf.len() - done).min(MAX_BLOCK);

            let mut cmd = vec![TX_DATA_BLOCK];
            cmd.push((a & 0xff) as u8);
            cmd.push(((a >> 8) & 0xff) as u8);
            cmd.push(((a >> 16) & 0xff) as u8);
            cmd.push((read_size & 0xff) as u8);
            cmd.push(((read_size >> 8) & 0xff) as u8);
            self.proto.send(&cmd)?;

            let reply = self.proto.recv()?;
            if reply.is_empty() {
                return Err(CoreError::framing("flash-bsl: empty read reply"));
            }
            match reply[0] {
                TAG_DATA => {
                    let n = reply.len() - 1;
                    buf[done..done + n].copy_from_slice(&reply[1..]);
                    done += n;
                }
                TAG_STATUS => {
                    return Err(CoreError::framing(format!(
                        "flash-bsl: {}",
                        status_message(*reply.get(1).unwrap_or(&0xff))
                    )))
                }
                _ => return Err(CoreError::framing("flash-bsl: invalid read response")),
            }
        }
        Ok(done)
    }

    fn writemem(&mut self, addr: Address, data: &[u8]) -> Result<usize> {
        let a0 = addr.raw();
        let len = data.len() as u32;
        if a0 > 0xfffff || a0 + len > 0x100000 {
            return Err(CoreError::semantic("flash-bsl: write exceeds possible range"));
        }

        let mut done = 0usize;
        while done < data.len() {
            let a = a0 + done as u32;
            let write_size = (data.len() - done).min(MAX_BLOCK);

            let mut cmd = vec![RX_DATA_BLOCK];
            cmd.push((a & 0xff) as u8);
            cmd.push(((a >> 8) & 0xff) as u8);
            cmd.push(((a >> 16) & 0xff) as u8);
            cmd.extend_from_slice(&data[done..done + write_size]);
            self.proto.send(&cmd)?;

            let reply = self.proto.recv()?;
            check_status(&reply, "flash-bsl write")?;
            done += write_size;
        }
        Ok(done)
    }

    fn erase(&mut self, kind: EraseKind, addr: Address) -> Result<()> {
        let cmd = match kind {
            EraseKind::All => {
                return Err(CoreError::semantic(
                    "flash-bsl: simultaneous code/info erase not supported",
                ))
            }
            EraseKind::Main => vec![MASS_ERASE],
            EraseKind::Segment => {
                let a = addr.raw();
                vec![
                    ERASE_SEGMENT,
                    (a & 0xff) as u8,
                    ((a >> 8) & 0xff) as u8,
                    ((a >> 16) & 0xff) as u8,
                ]
            }
        };
        self.proto.send(&cmd)?;
        let reply = self.proto.recv()?;
        check_status(&reply, "flash-bsl erase")
    }

    fn getregs(&mut self) -> Result<[u32; NUM_REGS]> {
        Err(CoreError::semantic("flash-bsl: register fetch is not implemented"))
    }

    fn setregs(&mut self, _regs: &[u32; NUM_REGS]) -> Result<()> {
        Err(CoreError::semantic("flash-bsl: register store is not implemented"))
    }

    fn ctl(&mut self, op: CtlOp) -> Result<()> {
        match op {
            CtlOp::Halt | CtlOp::Reset => Ok(()),
            _ => Err(CoreError::semantic("flash-bsl: CPU control is not possible")),
        }
    }

    fn poll(&mut self) -> Result<Status> {
        Ok(Status::Halted)
    }

    fn destroy(&mut self) {
        let (_entry, exit) = seq::split(FLASH_DEFAULT_SEQ);
        if let Err(e) = seq::run_serial(&mut self.proto.transport, exit) {
            warn!("flash-bsl: exit sequence failed: {}", e);
        }
    }

    fn setbrk(
        &mut self,
        _which: Option<usize>,
        _enabled: bool,
        _addr: Address,
        _bp_type: BreakType,
    ) -> Result<Option<usize>> {
        Err(CoreError::semantic("flash-bsl: breakpoints not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::LoopbackTransport;

    #[test]
    fn crc_matches_fet_table_implementation_on_self_test_vectors() {
        assert_eq!(crc_ccitt(&[0x52, 0x02]), 0x5590);
        assert_eq!(crc_ccitt(&[0x3a, 0x04, 0x01]), 0x121d);
        assert_eq!(crc_ccitt(&[0x1a]), 0x528b);
    }

    #[test]
    fn send_frames_payload_with_length_and_crc() {
        let t = LoopbackTransport::with_reply(&[0x00]);
        let mut p = FlashBslProto::new(t);
        p.send(&[TX_BSL_VERSION]).unwrap();
        let out = &p.transport.outbox;
        assert_eq!(out[0], 0x80);
        assert_eq!(u16::from_le_bytes([out[1], out[2]]), 1);
        let crc = crc_ccitt(&[TX_BSL_VERSION]);
        assert_eq!(u16::from_le_bytes([out[3], out[4]]), crc);
    }

    #[test]
    fn send_surfaces_error_code() {
        let t = LoopbackTransport::with_reply(&[0x52]); // checksum incorrect
        let mut p = FlashBslProto::new(t);
        assert!(p.send(&[TX_BSL_VERSION]).is_err());
    }

    #[test]
    fn recv_validates_crc_and_returns_payload() {
        let payload = vec![0x01, 0x02, 0x03];
        let crc = crc_ccitt(&payload);
        let mut framed = vec![0x80, payload.len() as u8, 0];
        framed.extend_from_slice(&payload);
        framed.push((crc & 0xff) as u8);
        framed.push((crc >> 8) as u8);

        let t = LoopbackTransport::with_reply(&framed);
        let mut p = FlashBslProto::new(t);
        assert_eq!(p.recv().unwrap(), payload);
    }

    #[test]
    fn recv_rejects_bad_crc() {
        let mut framed = vec![0x80, 1, 0, 0xaa, 0xde, 0xad];
        framed[3] = 0xaa;
        let t = LoopbackTransport::with_reply(&framed);
        let mut p = FlashBslProto::new(t);
        assert!(p.recv().is_err());
    }

    #[test]
    fn status_check_accepts_zero_code() {
        assert!(check_status(&[TAG_STATUS, 0x00], "x").is_ok());
        assert!(check_status(&[TAG_STATUS, 0x05], "x").is_err());
    }
}
