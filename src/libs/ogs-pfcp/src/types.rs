//! PFCP Types
//!
//! Constants and the handful of IE value types the UPF control plane needs
//! (3GPP TS 29.244 clause 8.2).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};

/// Supported PFCP version
pub const PFCP_VERSION: u8 = 1;

/// PFCP well-known UDP port
pub const PFCP_UDP_PORT: u16 = 8805;

/// Largest value representable in the 3-byte sequence number field
pub const PFCP_MAX_SEQUENCE: u32 = 0x00FF_FFFF;

/// PFCP Cause values (clause 8.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PfcpCause {
    RequestAccepted = 1,
    RequestRejected = 64,
    SessionContextNotFound = 65,
    MandatoryIeMissing = 66,
    ConditionalIeMissing = 67,
    InvalidLength = 68,
    MandatoryIeIncorrect = 69,
    NoEstablishedPfcpAssociation = 72,
    RuleCreationModificationFailure = 73,
    PfcpEntityInCongestion = 74,
    NoResourcesAvailable = 75,
    ServiceNotSupported = 76,
    SystemFailure = 77,
}

impl PfcpCause {
    /// Map a wire value; unknown values are reported as rejected
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::RequestAccepted,
            65 => Self::SessionContextNotFound,
            66 => Self::MandatoryIeMissing,
            67 => Self::ConditionalIeMissing,
            68 => Self::InvalidLength,
            69 => Self::MandatoryIeIncorrect,
            72 => Self::NoEstablishedPfcpAssociation,
            73 => Self::RuleCreationModificationFailure,
            74 => Self::PfcpEntityInCongestion,
            75 => Self::NoResourcesAvailable,
            76 => Self::ServiceNotSupported,
            77 => Self::SystemFailure,
            _ => Self::RequestRejected,
        }
    }

    pub fn is_accepted(&self) -> bool {
        *self == Self::RequestAccepted
    }
}

/// Node ID (clause 8.2.38)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeId {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Fqdn(String),
}

impl From<IpAddr> for NodeId {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => NodeId::Ipv4(v4),
            IpAddr::V6(v6) => NodeId::Ipv6(v6),
        }
    }
}

impl NodeId {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            NodeId::Ipv4(addr) => {
                buf.put_u8(0);
                buf.put_slice(&addr.octets());
            }
            NodeId::Ipv6(addr) => {
                buf.put_u8(1);
                buf.put_slice(&addr.octets());
            }
            NodeId::Fqdn(fqdn) => {
                buf.put_u8(2);
                for label in fqdn.split('.') {
                    buf.put_u8(label.len() as u8);
                    buf.put_slice(label.as_bytes());
                }
            }
        }
    }

    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        need(buf, 1)?;
        match buf.get_u8() & 0x0f {
            0 => {
                need(buf, 4)?;
                Ok(NodeId::Ipv4(Ipv4Addr::from(buf.get_u32())))
            }
            1 => {
                need(buf, 16)?;
                Ok(NodeId::Ipv6(Ipv6Addr::from(buf.get_u128())))
            }
            2 => {
                let mut labels = Vec::new();
                while buf.has_remaining() {
                    let len = buf.get_u8() as usize;
                    if len == 0 {
                        break;
                    }
                    need(buf, len)?;
                    let label = buf.copy_to_bytes(len);
                    labels.push(String::from_utf8_lossy(&label).into_owned());
                }
                Ok(NodeId::Fqdn(labels.join(".")))
            }
            other => Err(PfcpError::DecodingError(format!(
                "invalid node id type {other}"
            ))),
        }
    }
}

/// F-SEID (clause 8.2.37)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FSeid {
    pub seid: u64,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl FSeid {
    pub fn new(seid: u64, addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => FSeid { seid, ipv4: Some(v4), ipv6: None },
            IpAddr::V6(v6) => FSeid { seid, ipv4: None, ipv6: Some(v6) },
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let flags = ((self.ipv6.is_some() as u8) << 1) | self.ipv4.is_some() as u8;
        buf.put_u8(flags);
        buf.put_u64(self.seid);
        if let Some(v4) = self.ipv4 {
            buf.put_slice(&v4.octets());
        }
        if let Some(v6) = self.ipv6 {
            buf.put_slice(&v6.octets());
        }
    }

    pub fn decode(buf: &mut Bytes) -> PfcpResult<Self> {
        need(buf, 9)?;
        let flags = buf.get_u8();
        let seid = buf.get_u64();
        let ipv4 = if flags & 0x01 != 0 {
            need(buf, 4)?;
            Some(Ipv4Addr::from(buf.get_u32()))
        } else {
            None
        };
        let ipv6 = if flags & 0x02 != 0 {
            need(buf, 16)?;
            Some(Ipv6Addr::from(buf.get_u128()))
        } else {
            None
        };
        Ok(FSeid { seid, ipv4, ipv6 })
    }
}

/// Report Type bitmask (clause 8.2.21)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportType(pub u8);

impl ReportType {
    pub const DLDR: u8 = 0x01;
    pub const USAR: u8 = 0x02;
    pub const ERIR: u8 = 0x04;
    pub const UPIR: u8 = 0x08;

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn downlink_data(&self) -> bool {
        self.0 & Self::DLDR != 0
    }

    pub fn usage(&self) -> bool {
        self.0 & Self::USAR != 0
    }

    pub fn error_indication(&self) -> bool {
        self.0 & Self::ERIR != 0
    }
}

fn need(buf: &Bytes, needed: usize) -> PfcpResult<()> {
    if buf.remaining() < needed {
        return Err(PfcpError::BufferTooShort {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}
