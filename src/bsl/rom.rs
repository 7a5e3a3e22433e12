//! ROM-BSL: the mask-ROM bootstrap loader present on most MSP430
//! parts, accessed over a parity-even 9600-baud serial link. Grounded
//! on `original_source/drivers/rom_bsl.c`.

use crate::bsl::seq::{self, GpioPins};
use crate::bsl::ROM_DEFAULT_SEQ;
use crate::breakpoint::BreakType;
use crate::device::{CtlOp, Device, DeviceArgs, DeviceFlags, EraseKind, Status, NUM_REGS};
use crate::error::{CoreError, Result};
use crate::transport::Transport;
use crate::Address;

const DATA_HDR: u8 = 0x80;
const DATA_ACK: u8 = 0x90;
const DATA_NAK: u8 = 0xa0;

const CMD_RX_PASSWORD: u8 = 0x10;
const CMD_RX_DATA: u8 = 0x12;
const CMD_ERASE_SEGMENT: u8 = 0x16;
const CMD_TX_DATA: u8 = 0x14;
const CMD_MASS_ERASE: u8 = 0x18;
const CMD_TX_VERSION: u8 = 0x1e;

const UNLOCK_PASSWORD: [u8; 32] = [0xff; 32];

/// Framing/transport glue for ROM-BSL (spec.md §3 "BSL packet", §4.4).
///
/// The wire format is shared between ROM-BSL's data packets and its
/// "magic number" commands (mass erase, segment erase): `send_command`
/// has one payload-carrying form and one payload-less form where the
/// packet's length field instead carries a 16-bit magic constant,
/// mirroring `rom_bsl.c`'s `send_command`, which takes a single `len`
/// parameter serving both roles.
#[derive(Debug)]
pub struct RomBslProto<T: Transport> {
    transport: T,
    reply: Vec<u8>,
}

impl<T: Transport> RomBslProto<T> {
    pub fn new(transport: T) -> Self {
        RomBslProto { transport, reply: Vec::new() }
    }

    fn ack(&mut self) -> Result<()> {
        let mut b = [0u8; 1];
        self.transport.recv(&mut b)?;
        match b[0] {
            DATA_ACK => Ok(()),
            DATA_NAK => Err(CoreError::framing("rom-bsl: received NAK")),
            other => Err(CoreError::framing(format!("rom-bsl: bad ack byte 0x{:02x}", other))),
        }
    }

    fn sync(&mut self) -> Result<()> {
        self.transport.flush()?;
        let mut last_err = CoreError::framing("rom-bsl: sync failed");
        for _ in 0..2 {
            if self.transport.send(&[DATA_HDR]).is_ok() {
                match self.ack() {
                    Ok(()) => return Ok(()),
                    Err(e) => last_err = e,
                }
            }
        }
        Err(last_err)
    }

    /// Builds and sends a packet: header, code, even-length (twice),
    /// address, data-or-magic length, data, checksum pair.
    fn send_packet(&mut self, code: u8, addr: u16, data: Option<&[u8]>, len_field: u16) -> Result<()> {
        let mut pkt = Vec::with_capacity(260);
        pkt.push(DATA_HDR);
        pkt.push(code);

        let (pktlen, evenlen): (u8, u16) = match data {
            Some(d) => {
                let evenlen = if d.len() % 2 != 0 { d.len() + 1 } else { d.len() };
                ((evenlen + 4) as u8, evenlen as u16)
            }
            None => (4, len_field),
        };

        pkt.push(pktlen);
        pkt.push(pktlen);
        pkt.push((addr & 0xff) as u8);
        pkt.push((addr >> 8) as u8);
        pkt.push((evenlen & 0xff) as u8);
        pkt.push((evenlen >> 8) as u8);

        if let Some(d) = data {
            pkt.extend_from_slice(d);
            if d.len() % 2 != 0 {
                pkt.push(0xff);
            }
        }

        let body_len = pktlen as usize + 4;
        let mut cklow: u8 = 0xff;
        let mut ckhigh: u8 = 0xff;
        for (i, b) in pkt[..body_len].iter().enumerate() {
            if i % 2 == 0 {
                cklow ^= b;
            } else {
                ckhigh ^= b;
            }
        }
        pkt.push(cklow);
        pkt.push(ckhigh);

        self.transport.send(&pkt)
    }

    fn fetch_reply(&mut self) -> Result<()> {
        self.reply.clear();
        let mut chunk = [0u8; 256];
        loop {
            let n = self.transport.recv(&mut chunk)?;
            self.reply.extend_from_slice(&chunk[..n]);

            match self.reply.first().copied() {
                Some(DATA_ACK) => return Ok(()),
                Some(DATA_NAK) => return Err(CoreError::framing("rom-bsl: received NAK")),
                Some(DATA_HDR) => {
                    if self.reply.len() >= 6 && self.reply.len() == self.reply[2] as usize + 6 {
                        return self.verify_checksum();
                    }
                }
                Some(other) => {
                    return Err(CoreError::framing(format!(
                        "rom-bsl: unknown reply type 0x{:02x}",
                        other
                    )))
                }
                None => {}
            }

            if self.reply.len() >= 256 {
                return Err(CoreError::framing("rom-bsl: reply buffer overflow"));
            }
        }
    }

    fn verify_checksum(&self) -> Result<()> {
        let mut cklow: u8 = 0xff;
        let mut ckhigh: u8 = 0xff;
        for (i, b) in self.reply.iter().enumerate() {
            if i % 2 == 0 {
                cklow ^= b;
            } else {
                ckhigh ^= b;
            }
        }
        if cklow != 0 || ckhigh != 0 {
            return Err(CoreError::framing("rom-bsl: checksum invalid"));
        }
        Ok(())
    }

    /// `req_len` is the wire-level byte count requested when `data` is
    /// `None` (a read); it is ignored when `data` is `Some` since
    /// `send_packet` derives the length field from the payload itself.
    fn xfer_data(&mut self, code: u8, addr: u16, data: Option<&[u8]>, req_len: u16) -> Result<()> {
        self.sync()?;
        self.send_packet(code, addr, data, req_len)?;
        self.fetch_reply()
    }

    fn xfer_magic(&mut self, code: u8, addr: u16, magic: u16) -> Result<()> {
        self.sync()?;
        self.send_packet(code, addr, None, magic)?;
        self.fetch_reply()
    }
}

/// The ROM-BSL [`Device`] (spec.md §4.8): no register access, execution
/// is always considered halted, and `HALT`/`RESET` are no-ops because
/// the bootloader is the only thing running.
#[derive(Debug)]
pub struct RomBslDevice<T: Transport> {
    proto: RomBslProto<T>,
}

impl<T: Transport> RomBslDevice<T> {
    /// Opens a ROM-BSL connection: runs the entry sequence, queries the
    /// BSL version, then unlocks the device (spec.md §8 scenario 3).
    pub fn open(transport: T, args: &DeviceArgs) -> Result<Self> {
        let mut proto = RomBslProto::new(transport);
        let seq_str = args.bsl_entry_seq.as_deref().unwrap_or(ROM_DEFAULT_SEQ);
        let (entry, _exit) = seq::split(seq_str);

        match (args.bsl_gpio_rts, args.bsl_gpio_dtr) {
            (Some(rts), Some(dtr)) => GpioPins { rts, dtr }.run(entry)?,
            _ => seq::run_serial(&mut proto.transport, entry)?,
        }

        std::thread::sleep(std::time::Duration::from_millis(500));

        match proto.xfer_data(CMD_TX_VERSION, 0, None, 0) {
            Ok(()) if proto.reply.len() >= 19 => {
                debug!("BSL version is {:x}.{:02x}", proto.reply[15], proto.reply[16]);
            }
            Ok(()) => warn!("rom-bsl: short version reply"),
            Err(e) => warn!("rom-bsl: failed to read version: {}", e),
        }

        unlock(&mut proto)?;

        Ok(RomBslDevice { proto })
    }
}

fn unlock<T: Transport>(proto: &mut RomBslProto<T>) -> Result<()> {
    proto.xfer_magic(CMD_MASS_ERASE, 0xfffe, 0xa506)?;
    proto.xfer_data(CMD_RX_PASSWORD, 0, Some(&UNLOCK_PASSWORD), 0)
}

impl<T: Transport> Device for RomBslDevice<T> {
    fn readmem(&mut self, addr: Address, buf: &mut [u8]) -> Result<usize> {
        let a = addr.raw();
        let len = buf.len() as u32;
        if a >= 0x10000 || len > 0x10000 || a + len > 0x10000 {
            return Err(CoreError::semantic("rom-bsl: memory read out of range"));
        }

        let mut done = 0usize;
        while done < buf.len() {
            let mut a = a + done as u32;
            let mut count = (buf.len() - done).min(220);
            let mut align = 0usize;
            if a % 2 != 0 {
                a -= 1;
                count += 1;
                align = 1;
            }

            self.proto.xfer_data(CMD_TX_DATA, a as u16, None, count as u16)?;
            let mut got = count.min(self.proto.reply.get(2).copied().unwrap_or(0) as usize);
            if got < align {
                got = align;
            }
            let n = got - align;
            buf[done..done + n].copy_from_slice(&self.proto.reply[4 + align..4 + align + n]);
            done += n;
        }
        Ok(done)
    }

    fn writemem(&mut self, addr: Address, data: &[u8]) -> Result<usize> {
        let a0 = addr.raw();
        let len = data.len() as u32;
        if a0 >= 0x10000 || len > 0x10000 || a0 + len > 0x10000 {
            return Err(CoreError::semantic("rom-bsl: memory write out of range"));
        }

        let mut done = 0usize;
        while done < data.len() {
            let mut a = a0 + done as u32;
            let wlen = (data.len() - done).min(100);
            let mut tmp;
            let chunk: &[u8] = if a % 2 != 0 {
                tmp = Vec::with_capacity(wlen + 1);
                tmp.push(0xff);
                tmp.extend_from_slice(&data[done..done + wlen]);
                a -= 1;
                &tmp
            } else {
                &data[done..done + wlen]
            };

            self.proto.xfer_data(CMD_RX_DATA, a as u16, Some(chunk), 0)?;
            done += wlen;
        }
        Ok(done)
    }

    fn erase(&mut self, kind: EraseKind, addr: Address) -> Result<()> {
        match kind {
            EraseKind::Main => self.proto.xfer_magic(CMD_ERASE_SEGMENT, 0xfffe, 0xa504),
            EraseKind::Segment => self.proto.xfer_magic(CMD_ERASE_SEGMENT, addr.raw() as u16, 0xa502),
            EraseKind::All => self.proto.xfer_magic(CMD_MASS_ERASE, 0xfffe, 0xa506),
        }
    }

    fn getregs(&mut self) -> Result<[u32; NUM_REGS]> {
        Err(CoreError::semantic("rom-bsl: register fetch is not implemented"))
    }

    fn setregs(&mut self, _regs: &[u32; NUM_REGS]) -> Result<()> {
        Err(CoreError::semantic("rom-bsl: register store is not implemented"))
    }

    fn ctl(&mut self, op: CtlOp) -> Result<()> {
        match op {
            CtlOp::Halt | CtlOp::Reset => Ok(()),
            _ => Err(CoreError::semantic("rom-bsl: CPU control is not possible")),
        }
    }

    fn poll(&mut self) -> Result<Status> {
        Ok(Status::Halted)
    }

    fn destroy(&mut self) {
        let seq_str = ROM_DEFAULT_SEQ;
        let (_entry, exit) = seq::split(seq_str);
        if let Err(e) = seq::run_serial(&mut self.proto.transport, exit) {
            warn!("rom-bsl: exit sequence failed: {}", e);
        }
    }

    fn setbrk(
        &mut self,
        _which: Option<usize>,
        _enabled: bool,
        _addr: Address,
        _bp_type: BreakType,
    ) -> Result<Option<usize>> {
        Err(CoreError::semantic("rom-bsl: breakpoints not supported"))
    }
}

/// Returns `true` if `flags` requests the serial (TTY) path ROM-BSL
/// requires; raw USB access is not supported (mirrors `rom_bsl_open`'s
/// `DEVICE_FLAG_TTY` check).
pub fn requires_tty(flags: DeviceFlags) -> bool {
    flags.contains(DeviceFlags::TTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::LoopbackTransport;

    fn packet_with_checksum(code: u8, addr: u16, data: &[u8]) -> Vec<u8> {
        let mut p = RomBslProto::new(LoopbackTransport::default());
        p.send_packet(code, addr, Some(data), 0).unwrap();
        p.transport.outbox.clone()
    }

    #[test]
    fn data_packet_checksum_is_self_consistent() {
        let pkt = packet_with_checksum(CMD_RX_DATA, 0x4000, &[1, 2, 3, 4]);
        let mut cklow: u8 = 0xff;
        let mut ckhigh: u8 = 0xff;
        for (i, b) in pkt.iter().enumerate() {
            if i % 2 == 0 {
                cklow ^= b;
            } else {
                ckhigh ^= b;
            }
        }
        assert_eq!((cklow, ckhigh), (0, 0));
    }

    #[test]
    fn magic_command_encodes_erase_constant_in_length_field() {
        let mut p = RomBslProto::new(LoopbackTransport::default());
        p.send_packet(CMD_ERASE_SEGMENT, 0xfffe, None, 0xa504).unwrap();
        let pkt = &p.transport.outbox;
        assert_eq!(pkt[0], DATA_HDR);
        assert_eq!(pkt[1], CMD_ERASE_SEGMENT);
        assert_eq!(u16::from_le_bytes([pkt[6], pkt[7]]), 0xa504);
    }

    #[test]
    fn readmem_requests_computed_length_not_zero() {
        // A TX_DATA read must put the actual requested byte count in the
        // wire length field (rom_bsl.c's rom_bsl_readmem threads `count`
        // into rom_bsl_xfer), not a hardcoded 0.
        let mut p = RomBslProto::new(LoopbackTransport::default());
        p.send_packet(CMD_TX_DATA, 0x4000, None, 16).unwrap();
        let pkt = &p.transport.outbox;
        assert_eq!(u16::from_le_bytes([pkt[6], pkt[7]]), 16);
    }

    #[test]
    fn fetch_reply_accepts_bare_ack() {
        let t = LoopbackTransport::with_reply(&[DATA_ACK]);
        let mut p = RomBslProto::new(t);
        p.fetch_reply().unwrap();
    }

    #[test]
    fn fetch_reply_rejects_nak() {
        let t = LoopbackTransport::with_reply(&[DATA_NAK]);
        let mut p = RomBslProto::new(t);
        assert!(p.fetch_reply().is_err());
    }

    #[test]
    fn version_scenario_reads_byte_15_and_16() {
        // spec.md §8 scenario 3: TX_VERSION replies >= 19 bytes with
        // version [15]=0x01, [16]=0x61.
        let total_len = 19u8;
        let pktlen = total_len - 6;
        let mut payload = vec![0u8; pktlen as usize];
        payload[11] = 0x01; // buffer[15] = payload[4 + i] => i = 11
        payload[12] = 0x61; // buffer[16]

        let mut framed = vec![DATA_HDR, 0, pktlen, pktlen];
        framed.extend_from_slice(&payload);
        let mut cklow: u8 = 0xff;
        let mut ckhigh: u8 = 0xff;
        for (i, b) in framed.iter().enumerate() {
            if i % 2 == 0 {
                cklow ^= b;
            } else {
                ckhigh ^= b;
            }
        }
        framed.push(cklow);
        framed.push(ckhigh);
        assert_eq!(framed.len(), total_len as usize);

        let t = LoopbackTransport::with_reply(&framed);
        let mut p = RomBslProto::new(t);
        p.xfer_data(CMD_TX_VERSION, 0, None, 0).unwrap();
        assert!(p.reply.len() >= 19);
        assert_eq!(p.reply[15], 0x01);
        assert_eq!(p.reply[16], 0x61);
    }
}
