//! HAL message protocol (spec.md §4.3, L2b), grounded on
//! `original_source/drivers/hal_proto.c/.h`.
//!
//! Envelope: `length, type, ref_id, seq, payload..., [pad], [xor_lo,
//! xor_hi]`. `length` covers `type+ref+seq+payload+pad` (`payload_len +
//! 3`). `execute()` drives the fragmented `DATA -> ACK -> ... -> ACK`
//! loop used for high-level function calls.

use crate::error::{TransportError, TransportResult};
use crate::transport::Transport;

/// Low-level HAL message types (`hal_proto_type_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HalMsgType {
    UpInit = 0x51,
    UpErase = 0x52,
    UpWrite = 0x53,
    UpRead = 0x54,
    UpCore = 0x55,
    DcdcCalibrate = 0x56,
    DcdcInitInterface = 0x57,
    DcdcSubMcuVersion = 0x58,
    DcdcLayerVersion = 0x59,
    DcdcPowerDown = 0x60,
    DcdcSetVcc = 0x61,
    DcdcRestart = 0x62,
    CmdLegacy = 0x7e,
    CmdSync = 0x80,
    CmdExecute = 0x81,
    CmdExecuteLoop = 0x82,
    CmdLoad = 0x83,
    CmdLoadContinued = 0x84,
    CmdData = 0x85,
    CmdKill = 0x86,
    CmdMove = 0x87,
    CmdUnload = 0x88,
    CmdBypass = 0x89,
    CmdExecuteLoopCont = 0x8a,
    CmdComReset = 0x8b,
    CmdPauseLoop = 0x8c,
    CmdResumeLoop = 0x8d,
    Acknowledge = 0x91,
    Exception = 0x92,
    Data = 0x93,
    DataRequest = 0x94,
    Status = 0x95,
    /// Anything the table above doesn't name; preserved rather than
    /// rejected, since `execute`'s loop only cares whether a reply is
    /// `Acknowledge`, `Exception`, or `Data`.
    Other(u8),
}

impl HalMsgType {
    fn from_byte(b: u8) -> Self {
        use HalMsgType::*;
        match b {
            0x51 => UpInit,
            0x52 => UpErase,
            0x53 => UpWrite,
            0x54 => UpRead,
            0x55 => UpCore,
            0x56 => DcdcCalibrate,
            0x57 => DcdcInitInterface,
            0x58 => DcdcSubMcuVersion,
            0x59 => DcdcLayerVersion,
            0x60 => DcdcPowerDown,
            0x61 => DcdcSetVcc,
            0x62 => DcdcRestart,
            0x7e => CmdLegacy,
            0x80 => CmdSync,
            0x81 => CmdExecute,
            0x82 => CmdExecuteLoop,
            0x83 => CmdLoad,
            0x84 => CmdLoadContinued,
            0x85 => CmdData,
            0x86 => CmdKill,
            0x87 => CmdMove,
            0x88 => CmdUnload,
            0x89 => CmdBypass,
            0x8a => CmdExecuteLoopCont,
            0x8b => CmdComReset,
            0x8c => CmdPauseLoop,
            0x8d => CmdResumeLoop,
            0x91 => Acknowledge,
            0x92 => Exception,
            0x93 => Data,
            0x94 => DataRequest,
            0x95 => Status,
            other => Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        use HalMsgType::*;
        match self {
            UpInit => 0x51,
            UpErase => 0x52,
            UpWrite => 0x53,
            UpRead => 0x54,
            UpCore => 0x55,
            DcdcCalibrate => 0x56,
            DcdcInitInterface => 0x57,
            DcdcSubMcuVersion => 0x58,
            DcdcLayerVersion => 0x59,
            DcdcPowerDown => 0x60,
            DcdcSetVcc => 0x61,
            DcdcRestart => 0x62,
            CmdLegacy => 0x7e,
            CmdSync => 0x80,
            CmdExecute => 0x81,
            CmdExecuteLoop => 0x82,
            CmdLoad => 0x83,
            CmdLoadContinued => 0x84,
            CmdData => 0x85,
            CmdKill => 0x86,
            CmdMove => 0x87,
            CmdUnload => 0x88,
            CmdBypass => 0x89,
            CmdExecuteLoopCont => 0x8a,
            CmdComReset => 0x8b,
            CmdPauseLoop => 0x8c,
            CmdResumeLoop => 0x8d,
            Acknowledge => 0x91,
            Exception => 0x92,
            Data => 0x93,
            DataRequest => 0x94,
            Status => 0x95,
            Other(b) => b,
        }
    }
}

bitflags::bitflags! {
    pub struct HalProtoFlags: u8 {
        const CHECKSUM = 0x01;
    }
}

/// Per-frame payload ceiling (spec.md §4.3).
pub const HAL_MAX_PAYLOAD: usize = 253;
/// `execute()`'s aggregate-reply buffer (spec.md §4.3).
const EXECUTE_BUF: usize = 4096;

/// A decoded HAL reply header plus payload length.
#[derive(Debug, Clone, Copy)]
pub struct HalHeader {
    pub msg_type: u8,
    pub ref_id: u8,
    pub seq: u8,
}

/// The HAL envelope codec and execute-loop driver (spec.md §4.3).
#[derive(Debug)]
pub struct HalProto<T: Transport> {
    transport: T,
    flags: HalProtoFlags,
    ref_id: u8,

    last_type: u8,
    last_ref: u8,
    last_seq: u8,

    /// Aggregated `execute()` reply payload.
    payload: Vec<u8>,
}

impl<T: Transport> HalProto<T> {
    pub fn new(transport: T, flags: HalProtoFlags) -> Self {
        HalProto {
            transport,
            flags,
            ref_id: 0,
            last_type: 0,
            last_ref: 0,
            last_seq: 0,
            payload: Vec::new(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn last_header(&self) -> HalHeader {
        HalHeader {
            msg_type: self.last_type,
            ref_id: self.last_ref,
            seq: self.last_seq,
        }
    }

    /// Last `execute()`'s aggregated reply payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn send(&mut self, msg_type: HalMsgType, data: &[u8]) -> TransportResult<()> {
        if data.len() > HAL_MAX_PAYLOAD {
            return Err(TransportError::Protocol(format!(
                "hal: payload too long: {}",
                data.len()
            )));
        }

        let mut buf = Vec::with_capacity(data.len() + 6);
        buf.push((data.len() + 3) as u8);
        buf.push(msg_type.to_byte());
        buf.push(self.ref_id);
        buf.push(0);
        self.ref_id = (self.ref_id + 1) & 0x7f;

        buf.extend_from_slice(data);
        if buf.len() % 2 == 1 {
            buf.push(0);
        }

        if self.flags.contains(HalProtoFlags::CHECKSUM) {
            let mut sum_l: u8 = 0xff;
            let mut sum_h: u8 = 0xff;
            let mut i = 0;
            while i < buf.len() {
                sum_l ^= buf[i];
                sum_h ^= buf[i + 1];
                i += 2;
            }
            buf.push(sum_l);
            buf.push(sum_h);
        }

        self.transport.send(&buf)
    }

    /// Receives one framed reply, returning the payload length written
    /// into `out`.
    pub fn recv(&mut self, out: &mut [u8]) -> TransportResult<usize> {
        let mut rx = Vec::new();
        loop {
            let mut chunk = [0u8; 512];
            let want = chunk.len().min(512 - rx.len().min(512));
            let n = self.transport.recv(&mut chunk[..want.max(1)])?;
            rx.extend_from_slice(&chunk[..n]);

            if !rx.is_empty() {
                let expect_len = rx[0] as usize + 4 - (rx[0] as usize & 1);
                if rx.len() == expect_len {
                    break;
                }
                if rx.len() > expect_len {
                    return Err(TransportError::Protocol("hal: length mismatch".into()));
                }
            }
        }

        if rx.len() < 6 {
            return Err(TransportError::Protocol(format!(
                "hal: short read: {}",
                rx.len()
            )));
        }

        if self.flags.contains(HalProtoFlags::CHECKSUM) {
            let mut sum_h: u8 = 0xff;
            let mut sum_l: u8 = 0xff;
            let mut i = 0;
            while i < rx.len() {
                sum_h ^= rx[i];
                sum_l ^= rx[i + 1];
                i += 2;
            }
            if sum_h != 0 || sum_l != 0 {
                return Err(TransportError::Protocol("hal: bad checksum".into()));
            }
        }

        let len = rx[0] as usize - 3;
        self.last_type = rx[1];
        self.last_ref = rx[2];
        self.last_seq = rx[3];

        if len > out.len() {
            return Err(TransportError::Protocol("hal: reply too long".into()));
        }
        out[..len].copy_from_slice(&rx[4..4 + len]);
        Ok(len)
    }

    /// Executes a high-level function call: sends `CMD_EXECUTE` with
    /// `(fid, 0, args...)`, then loops receiving `DATA` fragments
    /// (each acknowledged with an empty `ACK`) until an `ACK` itself
    /// arrives or an `EXCEPTION` aborts the call. The fragment/ack
    /// alternation continues only while `ref & 0x80` is set.
    pub fn execute(&mut self, fid: u8, args: &[u8]) -> TransportResult<()> {
        if args.len() + 2 > HAL_MAX_PAYLOAD {
            return Err(TransportError::Protocol(format!(
                "hal: execute payload too big: {}",
                args.len()
            )));
        }
        let mut fdata = Vec::with_capacity(args.len() + 2);
        fdata.push(fid);
        fdata.push(0);
        fdata.extend_from_slice(args);

        self.send(HalMsgType::CmdExecute, &fdata)?;

        self.payload.clear();
        loop {
            let mut buf = [0u8; EXECUTE_BUF];
            let r = self.recv(&mut buf)?;

            if self.last_type == HalMsgType::Exception.to_byte() && r >= 2 {
                let code = u16::from_le_bytes([buf[0], buf[1]]);
                return Err(TransportError::Protocol(format!(
                    "hal: exception 0x{:04x}",
                    code
                )));
            }

            if self.last_type == HalMsgType::Acknowledge.to_byte() {
                break;
            }

            if self.last_type != HalMsgType::Data.to_byte() {
                return Err(TransportError::Protocol(format!(
                    "hal: no data (got type 0x{:02x})",
                    self.last_type
                )));
            }

            self.send(HalMsgType::Acknowledge, &[])?;
            self.payload.extend_from_slice(&buf[..r]);

            if self.last_ref & 0x80 == 0 {
                break;
            }
        }
        Ok(())
    }

    pub fn decode_type(b: u8) -> HalMsgType {
        HalMsgType::from_byte(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::LoopbackTransport;

    fn frame(msg_type: u8, ref_id: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![(payload.len() + 3) as u8, msg_type, ref_id, seq];
        buf.extend_from_slice(payload);
        if buf.len() % 2 == 1 {
            buf.push(0);
        }
        buf
    }

    #[test]
    fn send_then_recv_round_trip() {
        let mut hal = HalProto::new(LoopbackTransport::default(), HalProtoFlags::empty());
        hal.send(HalMsgType::CmdExecute, &[1, 2, 3]).unwrap();

        let reply = frame(HalMsgType::Acknowledge.to_byte(), 0, 0, &[9, 9]);
        hal.transport_mut().queue(&reply);

        let mut out = [0u8; 16];
        let n = hal.recv(&mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&out[..2], &[9, 9]);
        assert_eq!(hal.last_header().msg_type, HalMsgType::Acknowledge.to_byte());
    }

    #[test]
    fn ref_id_increments_mod_128() {
        let mut hal = HalProto::new(LoopbackTransport::default(), HalProtoFlags::empty());
        for _ in 0..200 {
            hal.send(HalMsgType::CmdExecute, &[]).unwrap();
        }
        assert!(hal.ref_id < 0x80);
    }

    #[test]
    fn execute_aggregates_fragments_until_ack() {
        let mut hal = HalProto::new(LoopbackTransport::default(), HalProtoFlags::empty());

        // First reply: DATA with ref|0x80 set, meaning another fragment follows.
        let data1 = frame(HalMsgType::Data.to_byte(), 0x80, 0, &[0xaa, 0xbb]);
        // Second reply (after our ACK): final ACK.
        let ack = frame(HalMsgType::Acknowledge.to_byte(), 0x00, 0, &[]);

        hal.transport_mut().queue(&data1);
        hal.transport_mut().queue(&ack);

        hal.execute(0x1f, &[0x01, 0x02]).unwrap();
        assert_eq!(hal.payload(), &[0xaa, 0xbb]);
    }

    #[test]
    fn execute_surfaces_exception_code() {
        let mut hal = HalProto::new(LoopbackTransport::default(), HalProtoFlags::empty());
        let exc = frame(HalMsgType::Exception.to_byte(), 0, 0, &[0x34, 0x12]);
        hal.transport_mut().queue(&exc);
        let err = hal.execute(0x01, &[]).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
