//! UPF N4 (PFCP) Message Handling
//!
//! Handlers run after the state machine has accepted a message. Requests
//! arrive with the remote transaction that will carry the answer;
//! responses arrive with the data of the local transaction they completed.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use ogs_pfcp::ie::IeType;
use ogs_pfcp::message::{parse_cause, AssociationSetup, Heartbeat};
use ogs_pfcp::types::PfcpCause;
use ogs_pfcp::{PfcpHeader, PfcpMessageType, PfcpResult, PfcpSend, XactId};

use crate::context::{SessId, UpfContext, XactData};
use crate::metrics::{
    CounterSink, UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ, UPF_METR_GLOB_CTR_SM_N4SESSIONREPORTSUCC,
};
use crate::n4_build::{SessionEstablishmentRequest, SessionModificationRequest};
use crate::pfcp_path;

// ============================================================================
// Node Messages
// ============================================================================

fn update_remote_recovery(ctx: &mut UpfContext, node: SocketAddr, recovery: u32) {
    let Some(n) = ctx.pfcp.nodes.find_mut(&node) else {
        return;
    };
    if let Some(prev) = n.remote_recovery {
        if prev != recovery {
            log::warn!("[{}] Remote PFCP restarted [{}->{}]", node, prev, recovery);
        }
    }
    n.remote_recovery = Some(recovery);
}

pub fn handle_heartbeat_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    xid: XactId,
    body: Bytes,
    now: Instant,
) -> PfcpResult<()> {
    match Heartbeat::decode(body) {
        Ok(hb) => update_remote_recovery(ctx, node, hb.recovery_time_stamp),
        Err(e) => log::warn!("[{}] Heartbeat Request: {}", node, e),
    }
    pfcp_path::send_heartbeat_response(ctx, tx, xid, now)
}

pub fn handle_heartbeat_response(ctx: &mut UpfContext, node: SocketAddr, body: Bytes) {
    match Heartbeat::decode(body) {
        Ok(hb) => update_remote_recovery(ctx, node, hb.recovery_time_stamp),
        Err(e) => log::warn!("[{}] Heartbeat Response: {}", node, e),
    }
}

/// Record the peer and accept. Association from the SMF is never refused.
pub fn handle_association_setup_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    xid: XactId,
    body: Bytes,
    now: Instant,
) -> PfcpResult<()> {
    match AssociationSetup::decode(body) {
        Ok(req) => {
            log::info!("[{}] PFCP associated with {:?}", node, req.node_id);
            update_remote_recovery(ctx, node, req.recovery_time_stamp);
            if let Some(n) = ctx.pfcp.nodes.find_mut(&node) {
                n.node_id = Some(req.node_id);
            }
        }
        Err(e) => log::warn!("[{}] Association Setup Request: {}", node, e),
    }
    pfcp_path::send_association_setup_response(ctx, tx, xid, PfcpCause::RequestAccepted, now)
}

/// Returns whether the peer accepted our association
pub fn handle_association_setup_response(
    ctx: &mut UpfContext,
    node: SocketAddr,
    body: Bytes,
) -> bool {
    let rsp = match AssociationSetup::decode(body) {
        Ok(rsp) => rsp,
        Err(e) => {
            log::error!("[{}] Association Setup Response: {}", node, e);
            return false;
        }
    };
    let cause = rsp.cause.unwrap_or(PfcpCause::RequestRejected);
    if !cause.is_accepted() {
        log::error!("[{}] Association Setup Cause[{:?}] : Not Accepted", node, cause);
        return false;
    }

    update_remote_recovery(ctx, node, rsp.recovery_time_stamp);
    if let Some(n) = ctx.pfcp.nodes.find_mut(&node) {
        n.node_id = Some(rsp.node_id);
    }
    true
}

pub fn handle_association_release_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    xid: XactId,
    now: Instant,
) -> PfcpResult<()> {
    log::info!("[{}] PFCP Association Release Request", node);
    pfcp_path::send_association_release_response(ctx, tx, xid, PfcpCause::RequestAccepted, now)
}

// ============================================================================
// Session Messages
// ============================================================================

/// Create (or find again) the session for the CP F-SEID and answer with
/// the UP F-SEID. Returns the session on success.
pub fn handle_session_establishment_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    xid: XactId,
    body: Bytes,
    now: Instant,
) -> PfcpResult<Option<SessId>> {
    const RSP: PfcpMessageType = PfcpMessageType::SessionEstablishmentResponse;

    ctx.metrics.increment_counter(UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ);

    let req = match SessionEstablishmentRequest::decode(body) {
        Ok(req) => req,
        Err(e) => {
            log::error!("[{}] Session Establishment Request: {}", node, e);
            pfcp_path::send_session_error_response(
                ctx,
                tx,
                xid,
                RSP,
                0,
                PfcpCause::MandatoryIeIncorrect,
                None,
                now,
            )?;
            return Ok(None);
        }
    };

    let Some(f_seid) = req.cp_f_seid else {
        log::error!("[{}] No CP F-SEID", node);
        pfcp_path::send_session_error_response(
            ctx,
            tx,
            xid,
            RSP,
            0,
            PfcpCause::MandatoryIeMissing,
            Some(IeType::FSeid),
            now,
        )?;
        return Ok(None);
    };

    let existing = ctx
        .sess_find_by_smf_n4_seid(node, f_seid.seid)
        .map(|sess| sess.id);
    let (sess_id, created) = match existing {
        Some(id) => {
            log::info!("[{}] Session re-established (smf_seid={:#x})", id, f_seid.seid);
            (id, false)
        }
        None => match ctx.sess_add(node, &f_seid) {
            Ok(sess) => (sess.id, true),
            Err(e) => {
                log::error!("[{}] sess_add() failed: {}", node, e);
                pfcp_path::send_session_error_response(
                    ctx,
                    tx,
                    xid,
                    RSP,
                    0,
                    PfcpCause::NoResourcesAvailable,
                    None,
                    now,
                )?;
                return Ok(None);
            }
        },
    };

    if let Some(sess) = ctx.sess_find_by_id_mut(sess_id) {
        sess.pdr_ids.extend(req.create_pdr.iter().copied());
    }

    if let Err(e) =
        pfcp_path::send_session_establishment_response(ctx, tx, xid, sess_id, &req.create_pdr, now)
    {
        if created {
            ctx.sess_remove(sess_id);
        }
        return Err(e);
    }
    Ok(Some(sess_id))
}

fn lookup_session(ctx: &UpfContext, h: &PfcpHeader) -> Option<(SessId, u64)> {
    let seid = h.seid.unwrap_or(0);
    let found = ctx
        .sess_find_by_upf_n4_seid(seid)
        .map(|sess| (sess.id, sess.smf_n4_f_seid.seid));
    if found.is_none() {
        log::warn!("No Context [SEID:{:#x}]", seid);
    }
    found
}

pub fn handle_session_modification_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    h: &PfcpHeader,
    body: Bytes,
    now: Instant,
) -> PfcpResult<Option<SessId>> {
    const RSP: PfcpMessageType = PfcpMessageType::SessionModificationResponse;

    let Some((sess_id, smf_seid)) = lookup_session(ctx, h) else {
        pfcp_path::send_session_error_response(
            ctx,
            tx,
            xid,
            RSP,
            0,
            PfcpCause::SessionContextNotFound,
            None,
            now,
        )?;
        return Ok(None);
    };

    let req = match SessionModificationRequest::decode(body) {
        Ok(req) => req,
        Err(e) => {
            log::error!("[{}] Session Modification Request: {}", sess_id, e);
            pfcp_path::send_session_error_response(
                ctx,
                tx,
                xid,
                RSP,
                smf_seid,
                PfcpCause::MandatoryIeIncorrect,
                None,
                now,
            )?;
            return Ok(None);
        }
    };

    if let Some(sess) = ctx.sess_find_by_id_mut(sess_id) {
        for pdr_id in &req.remove_pdr {
            if !sess.pdr_ids.remove(pdr_id) {
                log::warn!("[{}] Unknown PDR ID[{}]", sess_id, pdr_id);
            }
        }
        sess.pdr_ids.extend(req.create_pdr.iter().copied());
    }

    pfcp_path::send_session_modification_response(ctx, tx, xid, sess_id, &req.create_pdr, now)?;
    Ok(Some(sess_id))
}

/// Answer, then drop the session. A failed send leaves the session alone.
pub fn handle_session_deletion_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    h: &PfcpHeader,
    now: Instant,
) -> PfcpResult<Option<SessId>> {
    let Some((sess_id, _)) = lookup_session(ctx, h) else {
        pfcp_path::send_session_error_response(
            ctx,
            tx,
            xid,
            PfcpMessageType::SessionDeletionResponse,
            0,
            PfcpCause::SessionContextNotFound,
            None,
            now,
        )?;
        return Ok(None);
    };

    pfcp_path::send_session_deletion_response(ctx, tx, xid, sess_id, now)?;
    ctx.sess_remove(sess_id);
    Ok(Some(sess_id))
}

/// Returns whether the SMF accepted the report
pub fn handle_session_report_response(
    ctx: &mut UpfContext,
    data: XactData,
    h: &PfcpHeader,
    body: Bytes,
) -> bool {
    let XactData::SessionReport(sess_id) = data else {
        log::error!("Session Report Response without report transaction");
        return false;
    };
    if ctx.sess_find_by_id(sess_id).is_none() {
        log::error!("Session has already been removed [{}]", h.message_type);
    }

    match parse_cause(body) {
        Ok(cause) if cause.is_accepted() => {
            ctx.metrics.increment_counter(UPF_METR_GLOB_CTR_SM_N4SESSIONREPORTSUCC);
            true
        }
        Ok(cause) => {
            log::error!("[{}] Cause[{:?}] : Not Accepted", sess_id, cause);
            false
        }
        Err(e) => {
            log::error!("[{}] Session Report Response: {}", sess_id, e);
            false
        }
    }
}
