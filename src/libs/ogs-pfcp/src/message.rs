//! PFCP Messages
//!
//! Bodies of the node-level messages (heartbeat, association setup and
//! release) and of the session report exchange. Session establishment,
//! modification and deletion bodies depend on UPF session state and are
//! built by the daemon.

use bytes::{Bytes, BytesMut};

use crate::error::{PfcpError, PfcpResult};
use crate::ie::{encode_ie_with, encode_u16_ie, encode_u32_ie, encode_u8_ie, find, find_all, parse_all, IeType, RawIe};
use crate::types::{NodeId, PfcpCause, ReportType};

/// Heartbeat Request / Response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub recovery_time_stamp: u32,
}

impl Heartbeat {
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_u32_ie(buf, IeType::RecoveryTimeStamp, self.recovery_time_stamp);
    }

    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        let recovery_time_stamp = find(&ies, IeType::RecoveryTimeStamp)
            .and_then(RawIe::as_u32)
            .ok_or(PfcpError::MissingMandatoryIe("Recovery Time Stamp"))?;
        Ok(Self { recovery_time_stamp })
    }
}

/// Association Setup Request / Response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationSetup {
    pub node_id: NodeId,
    /// Present in responses only
    pub cause: Option<PfcpCause>,
    pub recovery_time_stamp: u32,
    pub up_function_features: Option<u16>,
}

impl AssociationSetup {
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_ie_with(buf, IeType::NodeId, |b| self.node_id.encode(b));
        if let Some(cause) = self.cause {
            encode_u8_ie(buf, IeType::Cause, cause as u8);
        }
        encode_u32_ie(buf, IeType::RecoveryTimeStamp, self.recovery_time_stamp);
        if let Some(features) = self.up_function_features {
            encode_u16_ie(buf, IeType::UpFunctionFeatures, features);
        }
    }

    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        let node_id = decode_node_id(&ies)?;
        let recovery_time_stamp = find(&ies, IeType::RecoveryTimeStamp)
            .and_then(RawIe::as_u32)
            .ok_or(PfcpError::MissingMandatoryIe("Recovery Time Stamp"))?;
        Ok(Self {
            node_id,
            cause: find(&ies, IeType::Cause)
                .and_then(RawIe::as_u8)
                .map(PfcpCause::from_u8),
            recovery_time_stamp,
            up_function_features: find(&ies, IeType::UpFunctionFeatures).and_then(RawIe::as_u16),
        })
    }
}

/// Association Release Request / Response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRelease {
    pub node_id: NodeId,
    pub cause: Option<PfcpCause>,
}

impl AssociationRelease {
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_ie_with(buf, IeType::NodeId, |b| self.node_id.encode(b));
        if let Some(cause) = self.cause {
            encode_u8_ie(buf, IeType::Cause, cause as u8);
        }
    }

    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        Ok(Self {
            node_id: decode_node_id(&ies)?,
            cause: find(&ies, IeType::Cause)
                .and_then(RawIe::as_u8)
                .map(PfcpCause::from_u8),
        })
    }
}

/// What the user plane has to report for a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPlaneReport {
    pub report_type: ReportType,
    /// PDR that buffered downlink data
    pub downlink_data_pdr_id: Option<u16>,
    /// (URR id, UR-SEQN) pairs that triggered a usage report
    pub usage_reports: Vec<(u32, u32)>,
}

/// Build a Session Report Request body. Returns `None` when there is
/// nothing to report.
pub fn build_session_report_request(report: &UserPlaneReport) -> Option<Bytes> {
    if report.report_type.is_empty() {
        return None;
    }

    let mut buf = BytesMut::new();
    encode_u8_ie(&mut buf, IeType::ReportType, report.report_type.0);
    if report.report_type.downlink_data() {
        let pdr_id = report.downlink_data_pdr_id?;
        encode_ie_with(&mut buf, IeType::DownlinkDataReport, |b| {
            encode_u16_ie(b, IeType::PdrId, pdr_id);
        });
    }
    if report.report_type.usage() {
        for (urr_id, ur_seqn) in &report.usage_reports {
            encode_ie_with(&mut buf, IeType::UsageReportSrr, |b| {
                encode_u32_ie(b, IeType::UrrId, *urr_id);
                encode_u32_ie(b, IeType::UrSeqn, *ur_seqn);
            });
        }
    }
    Some(buf.freeze())
}

/// Decode the report type and PDR/URR ids of a Session Report Request
pub fn parse_session_report_request(body: Bytes) -> PfcpResult<UserPlaneReport> {
    let ies = parse_all(body)?;
    let report_type = find(&ies, IeType::ReportType)
        .and_then(RawIe::as_u8)
        .map(ReportType)
        .ok_or(PfcpError::MissingMandatoryIe("Report Type"))?;

    let downlink_data_pdr_id = match find(&ies, IeType::DownlinkDataReport) {
        Some(ie) => {
            let inner = parse_all(ie.data.clone())?;
            find(&inner, IeType::PdrId).and_then(RawIe::as_u16)
        }
        None => None,
    };

    let mut usage_reports = Vec::new();
    for ie in find_all(&ies, IeType::UsageReportSrr) {
        let inner = parse_all(ie.data.clone())?;
        let urr_id = find(&inner, IeType::UrrId).and_then(RawIe::as_u32);
        let ur_seqn = find(&inner, IeType::UrSeqn).and_then(RawIe::as_u32);
        if let (Some(urr_id), Some(ur_seqn)) = (urr_id, ur_seqn) {
            usage_reports.push((urr_id, ur_seqn));
        }
    }

    Ok(UserPlaneReport {
        report_type,
        downlink_data_pdr_id,
        usage_reports,
    })
}

/// Body of any response that carries only a Cause
pub fn build_cause_only(cause: PfcpCause) -> Bytes {
    let mut buf = BytesMut::new();
    encode_u8_ie(&mut buf, IeType::Cause, cause as u8);
    buf.freeze()
}

/// Extract the mandatory Cause IE from a response body
pub fn parse_cause(body: Bytes) -> PfcpResult<PfcpCause> {
    let ies = parse_all(body)?;
    find(&ies, IeType::Cause)
        .and_then(RawIe::as_u8)
        .map(PfcpCause::from_u8)
        .ok_or(PfcpError::MissingMandatoryIe("Cause"))
}

fn decode_node_id(ies: &[RawIe]) -> PfcpResult<NodeId> {
    let ie = find(ies, IeType::NodeId).ok_or(PfcpError::MissingMandatoryIe("Node ID"))?;
    NodeId::decode(&mut ie.data.clone())
}
