//! PFCP Information Elements
//!
//! Generic TLV framing (clause 8.1.1) plus the IE type numbers used by the
//! node and session messages this library builds and parses.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};

/// PFCP IE type values (clause 8.1.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IeType {
    CreatePdr = 1,
    Pdi = 2,
    CreatedPdr = 8,
    RemovePdr = 15,
    Cause = 19,
    FTeid = 21,
    ReportType = 39,
    OffendingIe = 40,
    UpFunctionFeatures = 43,
    PdrId = 56,
    FSeid = 57,
    NodeId = 60,
    UsageReportSrr = 80,
    UrrId = 81,
    DownlinkDataReport = 83,
    RecoveryTimeStamp = 96,
    UrSeqn = 104,
    ErrorIndicationReport = 99,
}

impl TryFrom<u16> for IeType {
    type Error = PfcpError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::CreatePdr,
            2 => Self::Pdi,
            8 => Self::CreatedPdr,
            15 => Self::RemovePdr,
            19 => Self::Cause,
            21 => Self::FTeid,
            39 => Self::ReportType,
            40 => Self::OffendingIe,
            43 => Self::UpFunctionFeatures,
            56 => Self::PdrId,
            57 => Self::FSeid,
            60 => Self::NodeId,
            80 => Self::UsageReportSrr,
            81 => Self::UrrId,
            83 => Self::DownlinkDataReport,
            96 => Self::RecoveryTimeStamp,
            104 => Self::UrSeqn,
            99 => Self::ErrorIndicationReport,
            _ => return Err(PfcpError::InvalidIeType(value)),
        })
    }
}

/// IE header: 2-byte type, 2-byte length
pub const IE_HEADER_LEN: usize = 4;

/// One undecoded IE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIe {
    pub ie_type: u16,
    pub data: Bytes,
}

impl RawIe {
    pub fn new(ie_type: IeType, data: Bytes) -> Self {
        Self { ie_type: ie_type as u16, data }
    }

    pub fn is(&self, ie_type: IeType) -> bool {
        self.ie_type == ie_type as u16
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.ie_type);
        buf.put_u16(self.data.len() as u16);
        buf.put_slice(&self.data);
    }

    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        if buf.remaining() < IE_HEADER_LEN {
            return Err(PfcpError::BufferTooShort {
                needed: IE_HEADER_LEN,
                available: buf.remaining(),
            });
        }
        let ie_type = buf.get_u16();
        let length = buf.get_u16() as usize;
        if buf.remaining() < length {
            return Err(PfcpError::BufferTooShort {
                needed: length,
                available: buf.remaining(),
            });
        }
        Ok(Self {
            ie_type,
            data: buf.copy_to_bytes(length),
        })
    }

    /// First byte of the value, for single-octet IEs
    pub fn as_u8(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn as_u16(&self) -> Option<u16> {
        (self.data.len() >= 2).then(|| u16::from_be_bytes([self.data[0], self.data[1]]))
    }

    pub fn as_u32(&self) -> Option<u32> {
        (self.data.len() >= 4).then(|| {
            u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
        })
    }
}

/// Split a message body (or grouped IE value) into its IEs
pub fn parse_all(mut buf: Bytes) -> PfcpResult<Vec<RawIe>> {
    let mut ies = Vec::new();
    while buf.has_remaining() {
        ies.push(RawIe::decode(&mut buf)?);
    }
    Ok(ies)
}

pub fn find(ies: &[RawIe], ie_type: IeType) -> Option<&RawIe> {
    ies.iter().find(|ie| ie.is(ie_type))
}

pub fn find_all(ies: &[RawIe], ie_type: IeType) -> impl Iterator<Item = &RawIe> {
    ies.iter().filter(move |ie| ie.is(ie_type))
}

pub fn encode_u8_ie(buf: &mut BytesMut, ie_type: IeType, value: u8) {
    buf.put_u16(ie_type as u16);
    buf.put_u16(1);
    buf.put_u8(value);
}

pub fn encode_u16_ie(buf: &mut BytesMut, ie_type: IeType, value: u16) {
    buf.put_u16(ie_type as u16);
    buf.put_u16(2);
    buf.put_u16(value);
}

pub fn encode_u32_ie(buf: &mut BytesMut, ie_type: IeType, value: u32) {
    buf.put_u16(ie_type as u16);
    buf.put_u16(4);
    buf.put_u32(value);
}

/// Encode an IE whose value is written by `f`; the length is patched after.
pub fn encode_ie_with<F>(buf: &mut BytesMut, ie_type: IeType, f: F)
where
    F: FnOnce(&mut BytesMut),
{
    buf.put_u16(ie_type as u16);
    let len_pos = buf.len();
    buf.put_u16(0);
    f(buf);
    let len = (buf.len() - len_pos - 2) as u16;
    buf[len_pos..len_pos + 2].copy_from_slice(&len.to_be_bytes());
}
