//! UPF N4 (PFCP) Message Building
//!
//! Bodies of the session responses the UPF sends, and decoders for the
//! session requests it receives. Builders return `None` when asked for a
//! message type they do not produce.

use std::net::IpAddr;

use bytes::{Bytes, BytesMut};
use ogs_pfcp::ie::{encode_ie_with, encode_u16_ie, encode_u8_ie, find, find_all, parse_all, IeType, RawIe};
use ogs_pfcp::types::{FSeid, NodeId, PfcpCause};
use ogs_pfcp::{PfcpError, PfcpMessageType, PfcpResult};

use crate::context::UpfSess;

/// PFCP message body builder
#[derive(Debug, Default)]
pub struct PfcpMessageBuilder {
    buffer: BytesMut,
}

impl PfcpMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Bytes {
        self.buffer.freeze()
    }

    pub fn add_node_id(&mut self, node_id: &NodeId) -> &mut Self {
        encode_ie_with(&mut self.buffer, IeType::NodeId, |b| node_id.encode(b));
        self
    }

    pub fn add_cause(&mut self, cause: PfcpCause) -> &mut Self {
        encode_u8_ie(&mut self.buffer, IeType::Cause, cause as u8);
        self
    }

    pub fn add_f_seid(&mut self, f_seid: &FSeid) -> &mut Self {
        encode_ie_with(&mut self.buffer, IeType::FSeid, |b| f_seid.encode(b));
        self
    }

    pub fn add_offending_ie(&mut self, ie_type: IeType) -> &mut Self {
        encode_u16_ie(&mut self.buffer, IeType::OffendingIe, ie_type as u16);
        self
    }

    /// Grouped IE holding just a PDR ID
    pub fn add_pdr(&mut self, ie_type: IeType, pdr_id: u16) -> &mut Self {
        encode_ie_with(&mut self.buffer, ie_type, |b| {
            encode_u16_ie(b, IeType::PdrId, pdr_id);
        });
        self
    }
}

fn is_type(msg_type: u8, expected: PfcpMessageType) -> bool {
    if msg_type == expected as u8 {
        true
    } else {
        log::error!("Unexpected message type [{}], want {}", msg_type, expected.name());
        false
    }
}

/// Session Establishment Response: Node ID, Cause, UP F-SEID, Created PDRs
pub fn build_session_establishment_response(
    msg_type: u8,
    node_id: &NodeId,
    pfcp_addr: IpAddr,
    sess: &UpfSess,
    created_pdr: &[u16],
) -> Option<Bytes> {
    if !is_type(msg_type, PfcpMessageType::SessionEstablishmentResponse) {
        return None;
    }

    let mut builder = PfcpMessageBuilder::new();
    builder
        .add_node_id(node_id)
        .add_cause(PfcpCause::RequestAccepted)
        .add_f_seid(&FSeid::new(sess.upf_n4_seid, pfcp_addr));
    for pdr_id in created_pdr {
        builder.add_pdr(IeType::CreatedPdr, *pdr_id);
    }
    Some(builder.build())
}

/// Session Modification Response: Cause, Created PDRs
pub fn build_session_modification_response(
    msg_type: u8,
    sess: &UpfSess,
    created_pdr: &[u16],
) -> Option<Bytes> {
    if !is_type(msg_type, PfcpMessageType::SessionModificationResponse) {
        return None;
    }

    log::trace!("[{}] modification response, {} created PDR(s)", sess.id, created_pdr.len());
    let mut builder = PfcpMessageBuilder::new();
    builder.add_cause(PfcpCause::RequestAccepted);
    for pdr_id in created_pdr {
        builder.add_pdr(IeType::CreatedPdr, *pdr_id);
    }
    Some(builder.build())
}

/// Session Deletion Response: Cause
pub fn build_session_deletion_response(msg_type: u8, sess: &UpfSess) -> Option<Bytes> {
    if !is_type(msg_type, PfcpMessageType::SessionDeletionResponse) {
        return None;
    }

    log::trace!("[{}] deletion response", sess.id);
    let mut builder = PfcpMessageBuilder::new();
    builder.add_cause(PfcpCause::RequestAccepted);
    Some(builder.build())
}

/// Rejection of a session request. Establishment responses carry the
/// Node ID as well.
pub fn build_session_error_response(
    msg_type: u8,
    node_id: &NodeId,
    cause: PfcpCause,
    offending_ie: Option<IeType>,
) -> Option<Bytes> {
    let mut builder = PfcpMessageBuilder::new();
    match PfcpMessageType::from_u8(msg_type) {
        Some(PfcpMessageType::SessionEstablishmentResponse) => {
            builder.add_node_id(node_id);
        }
        Some(PfcpMessageType::SessionModificationResponse)
        | Some(PfcpMessageType::SessionDeletionResponse) => {}
        _ => {
            log::error!("Unexpected message type [{}]", msg_type);
            return None;
        }
    }
    builder.add_cause(cause);
    if let Some(ie_type) = offending_ie {
        builder.add_offending_ie(ie_type);
    }
    Some(builder.build())
}

fn decode_pdr_ids(ies: &[RawIe], ie_type: IeType) -> PfcpResult<Vec<u16>> {
    find_all(ies, ie_type)
        .map(|ie| {
            let inner = parse_all(ie.data.clone())?;
            find(&inner, IeType::PdrId)
                .and_then(RawIe::as_u16)
                .ok_or(PfcpError::MissingMandatoryIe("PDR ID"))
        })
        .collect()
}

fn encode_pdr_ids(buf: &mut BytesMut, ie_type: IeType, pdr_ids: &[u16]) {
    for pdr_id in pdr_ids {
        encode_ie_with(buf, ie_type, |b| encode_u16_ie(b, IeType::PdrId, *pdr_id));
    }
}

/// The parts of a Session Establishment Request the UPF acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEstablishmentRequest {
    pub node_id: Option<NodeId>,
    pub cp_f_seid: Option<FSeid>,
    pub create_pdr: Vec<u16>,
}

impl SessionEstablishmentRequest {
    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        let node_id = match find(&ies, IeType::NodeId) {
            Some(ie) => Some(NodeId::decode(&mut ie.data.clone())?),
            None => None,
        };
        let cp_f_seid = match find(&ies, IeType::FSeid) {
            Some(ie) => Some(FSeid::decode(&mut ie.data.clone())?),
            None => None,
        };
        Ok(Self {
            node_id,
            cp_f_seid,
            create_pdr: decode_pdr_ids(&ies, IeType::CreatePdr)?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        if let Some(node_id) = &self.node_id {
            encode_ie_with(&mut buf, IeType::NodeId, |b| node_id.encode(b));
        }
        if let Some(f_seid) = &self.cp_f_seid {
            encode_ie_with(&mut buf, IeType::FSeid, |b| f_seid.encode(b));
        }
        encode_pdr_ids(&mut buf, IeType::CreatePdr, &self.create_pdr);
        buf.freeze()
    }
}

/// The parts of a Session Modification Request the UPF acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionModificationRequest {
    pub create_pdr: Vec<u16>,
    pub remove_pdr: Vec<u16>,
}

impl SessionModificationRequest {
    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        Ok(Self {
            create_pdr: decode_pdr_ids(&ies, IeType::CreatePdr)?,
            remove_pdr: decode_pdr_ids(&ies, IeType::RemovePdr)?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_pdr_ids(&mut buf, IeType::CreatePdr, &self.create_pdr);
        encode_pdr_ids(&mut buf, IeType::RemovePdr, &self.remove_pdr);
        buf.freeze()
    }
}

/// Decoded session response, as the SMF sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    pub cause: PfcpCause,
    pub node_id: Option<NodeId>,
    pub up_f_seid: Option<FSeid>,
    pub created_pdr: Vec<u16>,
    pub offending_ie: Option<u16>,
}

impl SessionResponse {
    pub fn decode(body: Bytes) -> PfcpResult<Self> {
        let ies = parse_all(body)?;
        let cause = find(&ies, IeType::Cause)
            .and_then(RawIe::as_u8)
            .map(PfcpCause::from_u8)
            .ok_or(PfcpError::MissingMandatoryIe("Cause"))?;
        let node_id = match find(&ies, IeType::NodeId) {
            Some(ie) => Some(NodeId::decode(&mut ie.data.clone())?),
            None => None,
        };
        let up_f_seid = match find(&ies, IeType::FSeid) {
            Some(ie) => Some(FSeid::decode(&mut ie.data.clone())?),
            None => None,
        };
        Ok(Self {
            cause,
            node_id,
            up_f_seid,
            created_pdr: decode_pdr_ids(&ies, IeType::CreatedPdr)?,
            offending_ie: find(&ies, IeType::OffendingIe).and_then(RawIe::as_u16),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_util::{context, smf, smf_f_seid};

    fn sess() -> UpfSess {
        let mut ctx = context();
        ctx.sess_add(smf(), &smf_f_seid(0x42)).unwrap().clone()
    }

    fn node_id() -> NodeId {
        NodeId::Ipv4("127.0.0.7".parse().unwrap())
    }

    #[test]
    fn test_establishment_response() {
        let body = build_session_establishment_response(
            PfcpMessageType::SessionEstablishmentResponse as u8,
            &node_id(),
            "127.0.0.7".parse().unwrap(),
            &sess(),
            &[1, 2],
        )
        .unwrap();

        let rsp = SessionResponse::decode(body).unwrap();
        assert_eq!(rsp.cause, PfcpCause::RequestAccepted);
        assert_eq!(rsp.node_id, Some(node_id()));
        assert_eq!(
            rsp.up_f_seid,
            Some(FSeid::new(sess().upf_n4_seid, "127.0.0.7".parse().unwrap()))
        );
        assert_eq!(rsp.created_pdr, vec![1, 2]);
        assert_eq!(rsp.offending_ie, None);
    }

    #[test]
    fn test_builders_reject_wrong_type() {
        let s = sess();
        let wrong = PfcpMessageType::HeartbeatResponse as u8;
        assert!(build_session_establishment_response(
            wrong,
            &node_id(),
            "127.0.0.7".parse().unwrap(),
            &s,
            &[]
        )
        .is_none());
        assert!(build_session_modification_response(wrong, &s, &[]).is_none());
        assert!(build_session_deletion_response(wrong, &s).is_none());
        assert!(build_session_error_response(wrong, &node_id(), PfcpCause::SystemFailure, None).is_none());
    }

    #[test]
    fn test_modification_and_deletion_response() {
        let s = sess();
        let body = build_session_modification_response(
            PfcpMessageType::SessionModificationResponse as u8,
            &s,
            &[7],
        )
        .unwrap();
        let rsp = SessionResponse::decode(body).unwrap();
        assert_eq!(rsp.cause, PfcpCause::RequestAccepted);
        assert_eq!(rsp.created_pdr, vec![7]);
        assert_eq!(rsp.node_id, None);

        let body =
            build_session_deletion_response(PfcpMessageType::SessionDeletionResponse as u8, &s)
                .unwrap();
        assert_eq!(
            SessionResponse::decode(body).unwrap().cause,
            PfcpCause::RequestAccepted
        );
    }

    #[test]
    fn test_error_response() {
        let body = build_session_error_response(
            PfcpMessageType::SessionEstablishmentResponse as u8,
            &node_id(),
            PfcpCause::MandatoryIeMissing,
            Some(IeType::FSeid),
        )
        .unwrap();
        let rsp = SessionResponse::decode(body).unwrap();
        assert_eq!(rsp.cause, PfcpCause::MandatoryIeMissing);
        assert_eq!(rsp.node_id, Some(node_id()));
        assert_eq!(rsp.offending_ie, Some(IeType::FSeid as u16));

        let body = build_session_error_response(
            PfcpMessageType::SessionDeletionResponse as u8,
            &node_id(),
            PfcpCause::SessionContextNotFound,
            None,
        )
        .unwrap();
        let rsp = SessionResponse::decode(body).unwrap();
        assert_eq!(rsp.cause, PfcpCause::SessionContextNotFound);
        assert_eq!(rsp.node_id, None);
    }

    #[test]
    fn test_establishment_request_decode() {
        let req = SessionEstablishmentRequest {
            node_id: Some(NodeId::Ipv4("127.0.0.4".parse().unwrap())),
            cp_f_seid: Some(FSeid::new(0x42, "127.0.0.4".parse().unwrap())),
            create_pdr: vec![1, 2, 3],
        };
        assert_eq!(SessionEstablishmentRequest::decode(req.encode()).unwrap(), req);

        let empty = SessionEstablishmentRequest::decode(Bytes::new()).unwrap();
        assert!(empty.cp_f_seid.is_none());
        assert!(empty.create_pdr.is_empty());
    }

    #[test]
    fn test_create_pdr_without_id() {
        let mut buf = BytesMut::new();
        encode_ie_with(&mut buf, IeType::CreatePdr, |b| {
            encode_u8_ie(b, IeType::Cause, 1);
        });
        assert!(matches!(
            SessionEstablishmentRequest::decode(buf.freeze()),
            Err(PfcpError::MissingMandatoryIe("PDR ID"))
        ));
    }

    #[test]
    fn test_modification_request_decode() {
        let req = SessionModificationRequest {
            create_pdr: vec![4],
            remove_pdr: vec![1, 2],
        };
        assert_eq!(SessionModificationRequest::decode(req.encode()).unwrap(), req);
    }
}
