//! UPF PFCP Path Management
//!
//! Socket bring-up and teardown, the datagram listener, and the senders of
//! every N4 message the UPF originates or answers. Senders stage the
//! datagram in a transaction and commit it; nothing here writes to a
//! socket behind the transaction manager's back except the Version Not
//! Supported reply.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use ogs_pfcp::ie::IeType;
use ogs_pfcp::message::{
    build_session_report_request, AssociationRelease, AssociationSetup, Heartbeat,
    UserPlaneReport,
};
use ogs_pfcp::path::{pfcp_server, send_datagram};
use ogs_pfcp::types::PfcpCause;
use ogs_pfcp::{
    check_version, peek_sequence_number, version_not_supported_response, PfcpError,
    PfcpHeader, PfcpMessageType, PfcpResult, PfcpSend, XactId, XactTimeout,
};
use tokio::net::UdpSocket;

use crate::context::{SessId, UpfContext, XactData};
use crate::event::{EventQueue, UpfEvent};
use crate::metrics::{CounterSink, UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT};
use crate::n4_build;
use crate::upf_sm;

/// Largest datagram read from a PFCP socket
pub const MAX_SDU_LEN: usize = 8192;

// ============================================================================
// PFCP Open/Close
// ============================================================================

/// Bind one socket per configured server address
pub async fn pfcp_open(servers: &[SocketAddr]) -> io::Result<Vec<UdpSocket>> {
    let mut socks = Vec::with_capacity(servers.len());
    for addr in servers {
        socks.push(pfcp_server(*addr).await?);
    }
    Ok(socks)
}

/// Finalize every node, then release the sockets
pub fn pfcp_close(ctx: &mut UpfContext, socks: Vec<UdpSocket>, now: Instant) {
    let addrs: Vec<SocketAddr> = ctx.pfcp.nodes.iter().map(|n| n.addr).collect();
    for addr in addrs {
        upf_sm::pfcp_node_fsm_fini(ctx, &socks[..], addr, now);
    }
    ctx.pfcp.remove_all();
    if ctx.sess_count() > 0 {
        log::warn!("{} session(s) without a node", ctx.sess_count());
        ctx.sess_remove_all();
    }
    drop(socks);
    log::info!("PFCP path closed");
}

// ============================================================================
// PFCP Receive
// ============================================================================

/// Wait until any socket has a datagram and return its index
pub async fn pfcp_readable(socks: &[UdpSocket]) -> io::Result<usize> {
    poll_fn(|cx| {
        for (idx, sock) in socks.iter().enumerate() {
            if let Poll::Ready(ready) = sock.poll_recv_ready(cx) {
                return Poll::Ready(ready.map(|()| idx));
            }
        }
        Poll::Pending
    })
    .await
}

/// Read one datagram from `socks[idx]` and hand it to the event queue
pub fn pfcp_recv(
    ctx: &mut UpfContext,
    socks: &[UdpSocket],
    idx: usize,
    queue: &EventQueue,
    now: Instant,
) -> bool {
    let Some(sock) = socks.get(idx) else {
        return false;
    };

    let mut buf = BytesMut::zeroed(MAX_SDU_LEN);
    let (size, from) = match sock.try_recv_from(&mut buf) {
        Ok((0, from)) => {
            log::error!("recv_from() failed: empty datagram from [{}]", from);
            return false;
        }
        Ok(received) => received,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
        Err(e) => {
            log::error!("recv_from() failed: {}", e);
            return false;
        }
    };
    buf.truncate(size);

    pfcp_handle_datagram(ctx, socks, idx, from, buf.freeze(), queue, now)
}

/// Accept or reject one received datagram. Returns whether an event was
/// queued.
pub fn pfcp_handle_datagram<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    idx: usize,
    from: SocketAddr,
    pkbuf: Bytes,
    queue: &EventQueue,
    now: Instant,
) -> bool {
    match check_version(&pkbuf) {
        Ok(()) => {}
        Err(PfcpError::UnsupportedVersion(version)) => {
            log::error!("Not supported version[{}]", version);
            let rsp = version_not_supported_response(peek_sequence_number(&pkbuf));
            if let Some(sock) = socks.get(idx) {
                if let Err(e) = send_datagram(sock, &rsp, from) {
                    log::error!("send_to() failed: {}", e);
                }
            }
            return false;
        }
        Err(e) => {
            log::debug!("[{}] drop datagram: {}", from, e);
            return false;
        }
    }

    if let Err(e) = PfcpHeader::decode(&mut pkbuf.clone()) {
        log::debug!("[{}] drop datagram: {}", from, e);
        return false;
    }

    let (_, created) = ctx.pfcp.nodes.find_or_create(from, idx);
    if created {
        log::info!("[Added] Peer [{}]", from);
        upf_sm::pfcp_node_fsm_init(ctx, socks, from, now);
    }

    queue.push(UpfEvent::N4Message { node: from, pkbuf })
}

// ============================================================================
// PFCP Send Functions
// ============================================================================

fn stage_and_commit(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    h: &PfcpHeader,
    body: &[u8],
    now: Instant,
) -> PfcpResult<()> {
    ctx.pfcp.xacts.update_tx(xid, h, body).map_err(|e| {
        log::error!("update_tx() failed: {}", e);
        e
    })?;
    ctx.pfcp.xacts.commit(xid, tx, now).map_err(|e| {
        log::error!("[{}] commit() failed: {}", xid, e);
        e
    })
}

/// Open a local transaction towards `node`, send `h + body`, and drop the
/// transaction again if anything fails.
fn send_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    data: XactData,
    h: &PfcpHeader,
    body: &[u8],
    now: Instant,
) -> PfcpResult<XactId> {
    let xid = ctx.pfcp.xacts.local_create(node, data).map_err(|e| {
        log::error!("[{}] local_create() failed: {}", node, e);
        e
    })?;
    if let Err(e) = stage_and_commit(ctx, tx, xid, h, body, now) {
        ctx.pfcp.xacts.remove(xid);
        return Err(e);
    }
    Ok(xid)
}

pub fn send_heartbeat_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    now: Instant,
) -> PfcpResult<XactId> {
    let h = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 0);
    let mut body = BytesMut::new();
    Heartbeat {
        recovery_time_stamp: ctx.recovery_time_stamp,
    }
    .encode(&mut body);
    send_request(ctx, tx, node, XactData::Heartbeat, &h, &body, now)
}

pub fn send_heartbeat_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    now: Instant,
) -> PfcpResult<()> {
    let h = PfcpHeader::new(PfcpMessageType::HeartbeatResponse, 0);
    let mut body = BytesMut::new();
    Heartbeat {
        recovery_time_stamp: ctx.recovery_time_stamp,
    }
    .encode(&mut body);
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

pub fn send_association_setup_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    node: SocketAddr,
    now: Instant,
) -> PfcpResult<XactId> {
    let h = PfcpHeader::new(PfcpMessageType::AssociationSetupRequest, 0);
    let mut body = BytesMut::new();
    AssociationSetup {
        node_id: ctx.node_id.clone(),
        cause: None,
        recovery_time_stamp: ctx.recovery_time_stamp,
        up_function_features: Some(0),
    }
    .encode(&mut body);
    send_request(ctx, tx, node, XactData::AssociationSetup, &h, &body, now)
}

pub fn send_association_setup_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    cause: PfcpCause,
    now: Instant,
) -> PfcpResult<()> {
    let h = PfcpHeader::new(PfcpMessageType::AssociationSetupResponse, 0);
    let mut body = BytesMut::new();
    AssociationSetup {
        node_id: ctx.node_id.clone(),
        cause: Some(cause),
        recovery_time_stamp: ctx.recovery_time_stamp,
        up_function_features: Some(0),
    }
    .encode(&mut body);
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

pub fn send_association_release_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    cause: PfcpCause,
    now: Instant,
) -> PfcpResult<()> {
    let h = PfcpHeader::new(PfcpMessageType::AssociationReleaseResponse, 0);
    let mut body = BytesMut::new();
    AssociationRelease {
        node_id: ctx.node_id.clone(),
        cause: Some(cause),
    }
    .encode(&mut body);
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

/// Send Session Establishment Response
pub fn send_session_establishment_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    sess_id: SessId,
    created_pdr: &[u16],
    now: Instant,
) -> PfcpResult<()> {
    let sess = ctx
        .sess_find_by_id(sess_id)
        .ok_or(PfcpError::InvalidState("session removed"))?;
    let h = PfcpHeader::new_with_seid(
        PfcpMessageType::SessionEstablishmentResponse,
        sess.smf_n4_f_seid.seid,
        0,
    );
    let body = n4_build::build_session_establishment_response(
        h.message_type,
        &ctx.node_id,
        ctx.pfcp_addr,
        sess,
        created_pdr,
    )
    .ok_or_else(|| {
        log::error!("build_session_establishment_response() failed");
        PfcpError::BuildFailed("session establishment response")
    })?;
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

/// Send Session Modification Response
pub fn send_session_modification_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    sess_id: SessId,
    created_pdr: &[u16],
    now: Instant,
) -> PfcpResult<()> {
    let sess = ctx
        .sess_find_by_id(sess_id)
        .ok_or(PfcpError::InvalidState("session removed"))?;
    let h = PfcpHeader::new_with_seid(
        PfcpMessageType::SessionModificationResponse,
        sess.smf_n4_f_seid.seid,
        0,
    );
    let body = n4_build::build_session_modification_response(h.message_type, sess, created_pdr)
        .ok_or_else(|| {
            log::error!("build_session_modification_response() failed");
            PfcpError::BuildFailed("session modification response")
        })?;
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

/// Send Session Deletion Response. The session itself is left to the
/// caller.
pub fn send_session_deletion_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    sess_id: SessId,
    now: Instant,
) -> PfcpResult<()> {
    let sess = ctx
        .sess_find_by_id(sess_id)
        .ok_or(PfcpError::InvalidState("session removed"))?;
    let h = PfcpHeader::new_with_seid(
        PfcpMessageType::SessionDeletionResponse,
        sess.smf_n4_f_seid.seid,
        0,
    );
    let body = n4_build::build_session_deletion_response(h.message_type, sess).ok_or_else(|| {
        log::error!("build_session_deletion_response() failed");
        PfcpError::BuildFailed("session deletion response")
    })?;
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

/// Reject a session request. `seid` is the peer SEID, 0 when the session
/// is unknown.
#[allow(clippy::too_many_arguments)]
pub fn send_session_error_response(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    xid: XactId,
    msg_type: PfcpMessageType,
    seid: u64,
    cause: PfcpCause,
    offending_ie: Option<IeType>,
    now: Instant,
) -> PfcpResult<()> {
    let h = PfcpHeader::new_with_seid(msg_type, seid, 0);
    let body =
        n4_build::build_session_error_response(h.message_type, &ctx.node_id, cause, offending_ie)
            .ok_or_else(|| {
                log::error!("build_session_error_response() failed");
                PfcpError::BuildFailed("session error response")
            })?;
    stage_and_commit(ctx, tx, xid, &h, &body, now)
}

/// Send Session Report Request. The transaction remembers the session by
/// id so its timeout can look it up again.
pub fn send_session_report_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    sess_id: SessId,
    report: &UserPlaneReport,
    now: Instant,
) -> PfcpResult<XactId> {
    ctx.metrics.increment_counter(UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT);

    let Some((node, seid)) = ctx
        .sess_find_by_id(sess_id)
        .map(|sess| (sess.node, sess.smf_n4_f_seid.seid))
    else {
        log::error!("[{}] Session has already been removed", sess_id);
        return Err(PfcpError::InvalidState("session removed"));
    };

    let xid = ctx
        .pfcp
        .xacts
        .local_create(node, XactData::SessionReport(sess_id))
        .map_err(|e| {
            log::error!("[{}] local_create() failed: {}", node, e);
            e
        })?;

    let h = PfcpHeader::new_with_seid(PfcpMessageType::SessionReportRequest, seid, 0);
    let result = match build_session_report_request(report) {
        Some(body) => stage_and_commit(ctx, tx, xid, &h, &body, now),
        None => {
            log::error!("build_session_report_request() failed");
            Err(PfcpError::BuildFailed("session report request"))
        }
    };
    if let Err(e) = result {
        ctx.pfcp.xacts.remove(xid);
        return Err(e);
    }
    Ok(xid)
}

/// Timeout of a session-scoped local transaction. Returns the session if
/// it still exists.
pub fn sess_timeout(ctx: &UpfContext, timeout: &XactTimeout<XactData>) -> Option<SessId> {
    let XactData::SessionReport(sess_id) = timeout.data else {
        return None;
    };

    let Some(sess) = ctx.sess_find_by_id(sess_id) else {
        log::error!("Session has already been removed [{}]", timeout.message_type);
        return None;
    };

    match PfcpMessageType::from_u8(timeout.message_type) {
        Some(PfcpMessageType::SessionReportRequest) => log::error!(
            "[{}] No PFCP session report response (upf_seid={:#x}, sqn {})",
            sess.id,
            sess.upf_n4_seid,
            timeout.sequence_number
        ),
        _ => log::error!("Not implemented [type:{}]", timeout.message_type),
    }
    Some(sess.id)
}
