//! PFCP Header
//!
//! PFCP message header as specified in 3GPP TS 29.244 clause 7.2.2.
//!
//! Decoding is version agnostic: the version field is reported, not judged.
//! Rejecting a foreign version is the listener's job, because the reply it
//! owes the peer depends on the sequence number decoded here.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};
use crate::types::{PFCP_MAX_SEQUENCE, PFCP_VERSION};

/// Flags, type and length; present in every PFCP message
pub const PFCP_HEADER_PREFIX_LEN: usize = 4;

/// PFCP Header length without SEID (8 bytes)
pub const PFCP_HEADER_LEN: usize = 8;

/// PFCP Header length with SEID (16 bytes)
pub const PFCP_HEADER_LEN_WITH_SEID: usize = 16;

/// Length of a Version Not Supported Response
pub const PFCP_VERSION_NOT_SUPPORTED_LEN: usize = 8;

const FLAG_SEID: u8 = 0x01;
const FLAG_MP: u8 = 0x02;

/// PFCP Message Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PfcpMessageType {
    HeartbeatRequest = 1,
    HeartbeatResponse = 2,
    AssociationSetupRequest = 5,
    AssociationSetupResponse = 6,
    AssociationReleaseRequest = 9,
    AssociationReleaseResponse = 10,
    VersionNotSupportedResponse = 11,
    SessionEstablishmentRequest = 50,
    SessionEstablishmentResponse = 51,
    SessionModificationRequest = 52,
    SessionModificationResponse = 53,
    SessionDeletionRequest = 54,
    SessionDeletionResponse = 55,
    SessionReportRequest = 56,
    SessionReportResponse = 57,
}

impl PfcpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::HeartbeatRequest,
            2 => Self::HeartbeatResponse,
            5 => Self::AssociationSetupRequest,
            6 => Self::AssociationSetupResponse,
            9 => Self::AssociationReleaseRequest,
            10 => Self::AssociationReleaseResponse,
            11 => Self::VersionNotSupportedResponse,
            50 => Self::SessionEstablishmentRequest,
            51 => Self::SessionEstablishmentResponse,
            52 => Self::SessionModificationRequest,
            53 => Self::SessionModificationResponse,
            54 => Self::SessionDeletionRequest,
            55 => Self::SessionDeletionResponse,
            56 => Self::SessionReportRequest,
            57 => Self::SessionReportResponse,
            _ => return None,
        })
    }

    /// Session messages carry an SEID in the header
    pub fn has_seid(&self) -> bool {
        (*self as u8) >= 50
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::HeartbeatRequest
                | Self::AssociationSetupRequest
                | Self::AssociationReleaseRequest
                | Self::SessionEstablishmentRequest
                | Self::SessionModificationRequest
                | Self::SessionDeletionRequest
                | Self::SessionReportRequest
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HeartbeatRequest => "Heartbeat Request",
            Self::HeartbeatResponse => "Heartbeat Response",
            Self::AssociationSetupRequest => "Association Setup Request",
            Self::AssociationSetupResponse => "Association Setup Response",
            Self::AssociationReleaseRequest => "Association Release Request",
            Self::AssociationReleaseResponse => "Association Release Response",
            Self::VersionNotSupportedResponse => "Version Not Supported Response",
            Self::SessionEstablishmentRequest => "Session Establishment Request",
            Self::SessionEstablishmentResponse => "Session Establishment Response",
            Self::SessionModificationRequest => "Session Modification Request",
            Self::SessionModificationResponse => "Session Modification Response",
            Self::SessionDeletionRequest => "Session Deletion Request",
            Self::SessionDeletionResponse => "Session Deletion Response",
            Self::SessionReportRequest => "Session Report Request",
            Self::SessionReportResponse => "Session Report Response",
        }
    }
}

/// Whether a raw type value is a request. Node messages (below 50) use odd
/// values for requests, session messages even ones.
pub fn is_request_type(message_type: u8) -> bool {
    match PfcpMessageType::from_u8(message_type) {
        Some(t) => t.is_request(),
        None if message_type < 50 => message_type % 2 == 1,
        None => message_type % 2 == 0,
    }
}

/// PFCP Header structure
///
/// ```text
///  octet 1   | Ver(3) | Spare(3) | MP | S |
///  octet 2   | Message Type                |
///  octet 3-4 | Message Length              |
///  octet 5-12| SEID (only if S = 1)        |
///  +3        | Sequence Number             |
///  +1        | Priority(4) | Spare(4)      |
/// ```
///
/// `message_type` is kept raw so that unknown types still decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpHeader {
    pub version: u8,
    pub message_type: u8,
    /// Octets after the 4-byte prefix: SEID, sequence, spare and body
    pub length: u16,
    pub seid: Option<u64>,
    pub sequence_number: u32,
    /// Message priority, present iff the MP flag is set
    pub priority: Option<u8>,
}

impl PfcpHeader {
    /// Header for a node message (no SEID)
    pub fn new(message_type: PfcpMessageType, sequence_number: u32) -> Self {
        Self {
            version: PFCP_VERSION,
            message_type: message_type as u8,
            length: 0,
            seid: None,
            sequence_number,
            priority: None,
        }
    }

    /// Header for a session message addressed to `seid`
    pub fn new_with_seid(message_type: PfcpMessageType, seid: u64, sequence_number: u32) -> Self {
        Self {
            seid: Some(seid),
            ..Self::new(message_type, sequence_number)
        }
    }

    pub fn msg_type(&self) -> Option<PfcpMessageType> {
        PfcpMessageType::from_u8(self.message_type)
    }

    pub fn header_len(&self) -> usize {
        if self.seid.is_some() {
            PFCP_HEADER_LEN_WITH_SEID
        } else {
            PFCP_HEADER_LEN
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut flags = (self.version & 0x07) << 5;
        if self.seid.is_some() {
            flags |= FLAG_SEID;
        }
        if self.priority.is_some() {
            flags |= FLAG_MP;
        }
        buf.put_u8(flags);
        buf.put_u8(self.message_type);
        buf.put_u16(self.length);
        if let Some(seid) = self.seid {
            buf.put_u64(seid);
        }
        let sqn = (self.sequence_number & PFCP_MAX_SEQUENCE).to_be_bytes();
        buf.put_slice(&sqn[1..]);
        buf.put_u8(self.priority.map(|p| (p & 0x0f) << 4).unwrap_or(0));
    }

    /// Decode the header and advance `buf` to the message body.
    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        if buf.remaining() < PFCP_HEADER_PREFIX_LEN {
            return Err(PfcpError::MalformedHeader {
                needed: PFCP_HEADER_PREFIX_LEN,
                available: buf.remaining(),
            });
        }
        let flags = buf[0];
        let with_seid = flags & FLAG_SEID != 0;
        let needed = if with_seid {
            PFCP_HEADER_LEN_WITH_SEID
        } else {
            PFCP_HEADER_LEN
        };
        if buf.remaining() < needed {
            return Err(PfcpError::MalformedHeader {
                needed,
                available: buf.remaining(),
            });
        }

        buf.advance(1);
        let message_type = buf.get_u8();
        let length = buf.get_u16();
        let seid = with_seid.then(|| buf.get_u64());
        let mut sqn = [0u8; 4];
        buf.copy_to_slice(&mut sqn[1..]);
        let last = buf.get_u8();

        Ok(Self {
            version: flags >> 5,
            message_type,
            length,
            seid,
            sequence_number: u32::from_be_bytes(sqn),
            priority: (flags & FLAG_MP != 0).then_some(last >> 4),
        })
    }
}

/// Serialize `header` followed by `body`, filling in the length field.
pub fn build_message(header: &PfcpHeader, body: &[u8]) -> Bytes {
    let mut h = header.clone();
    h.length = (h.header_len() - PFCP_HEADER_PREFIX_LEN + body.len()) as u16;
    let mut buf = BytesMut::with_capacity(h.header_len() + body.len());
    h.encode(&mut buf);
    buf.put_slice(body);
    buf.freeze()
}

/// Check the version field of a raw datagram. Only the 4-byte prefix is
/// needed, so a foreign version is recognised even when the rest of the
/// header would not decode.
pub fn check_version(buf: &[u8]) -> PfcpResult<()> {
    if buf.len() < PFCP_HEADER_PREFIX_LEN {
        return Err(PfcpError::MalformedHeader {
            needed: PFCP_HEADER_PREFIX_LEN,
            available: buf.len(),
        });
    }
    match buf[0] >> 5 {
        PFCP_VERSION => Ok(()),
        version => Err(PfcpError::UnsupportedVersion(version)),
    }
}

/// Sequence number at the position it takes in a header without SEID,
/// read straight after the prefix whatever the flags say. 0 when the
/// datagram ends first.
pub fn peek_sequence_number(buf: &[u8]) -> u32 {
    match buf.get(PFCP_HEADER_PREFIX_LEN..PFCP_HEADER_PREFIX_LEN + 3) {
        Some(sqn) => u32::from_be_bytes([0, sqn[0], sqn[1], sqn[2]]),
        None => 0,
    }
}

/// The 8-byte reply to a request carrying a foreign version. The
/// request's sequence number is echoed.
pub fn version_not_supported_response(sequence_number: u32) -> [u8; PFCP_VERSION_NOT_SUPPORTED_LEN] {
    let sqn = (sequence_number & PFCP_MAX_SEQUENCE).to_be_bytes();
    [
        PFCP_VERSION << 5,
        PfcpMessageType::VersionNotSupportedResponse as u8,
        0,
        4,
        sqn[1],
        sqn[2],
        sqn[3],
        0,
    ]
}
