//! UPF State Machine
//!
//! Operational event dispatch. N4 messages go through the transaction
//! layer first (duplicate requests and stray responses stop there), then
//! through the node state machine in [`crate::pfcp_sm`], whose actions are
//! carried out here.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use ogs_pfcp::xact::XactState;
use ogs_pfcp::{
    NodeTimer, PfcpHeader, PfcpMessageType, PfcpResult, PfcpSend, PfcpState, PfcpTimer,
    RequestDisposition, XactId,
};

use crate::context::{UpfContext, XactData};
use crate::event::UpfEvent;
use crate::n4_handler;
use crate::pfcp_path;
use crate::pfcp_sm::{self, PfcpAction, PfcpSmEvent, PfcpSmResult};
use crate::timer::UpfTimerId;

/// Message that triggered a state machine run
enum Inbound {
    Request {
        xid: XactId,
        header: PfcpHeader,
        body: Bytes,
    },
    Response {
        data: XactData,
        header: PfcpHeader,
        body: Bytes,
    },
}

/// Handle one event from the queue
pub fn dispatch<S: PfcpSend>(ctx: &mut UpfContext, socks: &[S], event: UpfEvent, now: Instant) {
    log::debug!("upf_state_operational(): {}", event.name());

    match event {
        UpfEvent::N4Message { node, pkbuf } => handle_n4_message(ctx, socks, node, pkbuf, now),
        UpfEvent::N4Timer(PfcpTimer::Node(timer)) => {
            let kind = UpfTimerId::from(timer);
            log::debug!("[{}] {} expired", timer.addr(), kind.name());
            let event = match kind {
                UpfTimerId::Association => PfcpSmEvent::AssociationTimer,
                UpfTimerId::NoHeartbeat => PfcpSmEvent::NoHeartbeatTimer,
            };
            node_event(ctx, socks, timer.addr(), event, None, now)
        }
        UpfEvent::N4Timer(PfcpTimer::Xact(xid)) => xact_timer(ctx, socks, xid, now),
        UpfEvent::N4NoHeartbeat(addr) => {
            node_event(ctx, socks, addr, PfcpSmEvent::NoHeartbeat, None, now)
        }
        UpfEvent::SessionReport { sess_id, report } => {
            let Some(node) = ctx.sess_find_by_id(sess_id).map(|sess| sess.node) else {
                log::error!("[{}] Session has already been removed", sess_id);
                return;
            };
            let Some(tx) = sock_for(ctx, socks, &node) else {
                return;
            };
            if let Err(e) = pfcp_path::send_session_report_request(ctx, tx, sess_id, &report, now) {
                log::error!("[{}] Session Report Request not sent: {}", sess_id, e);
            }
        }
    }
}

/// Start the state machine of a freshly added node
pub fn pfcp_node_fsm_init<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    addr: SocketAddr,
    now: Instant,
) {
    node_event(ctx, socks, addr, PfcpSmEvent::Entry, None, now);
}

/// Stop the state machine and forget the node with its sessions and
/// transactions. Unknown nodes are ignored.
pub fn pfcp_node_fsm_fini<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    addr: SocketAddr,
    now: Instant,
) {
    if ctx.pfcp.nodes.find(&addr).is_none() {
        return;
    }
    node_event(ctx, socks, addr, PfcpSmEvent::Final, None, now);
    let sessions = ctx.sess_remove_all_for_node(&addr);
    ctx.pfcp.remove_node(&addr);
    log::info!("[Removed] Peer [{}] ({} session(s))", addr, sessions);
}

fn sock_for<'a, S: PfcpSend>(
    ctx: &UpfContext,
    socks: &'a [S],
    addr: &SocketAddr,
) -> Option<&'a S> {
    let Some(node) = ctx.pfcp.nodes.find(addr) else {
        log::error!("[{}] No PFCP node", addr);
        return None;
    };
    let sock = socks.get(node.sock);
    if sock.is_none() {
        log::error!("[{}] No PFCP socket [{}]", addr, node.sock);
    }
    sock
}

fn handle_n4_message<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    node: SocketAddr,
    pkbuf: Bytes,
    now: Instant,
) {
    let mut body = pkbuf;
    let h = match PfcpHeader::decode(&mut body) {
        Ok(h) => h,
        Err(e) => {
            log::error!("[{}] {}", node, e);
            return;
        }
    };
    let Some(msg_type) = h.msg_type() else {
        log::error!("[{}] Unknown PFCP message type[{}]", node, h.message_type);
        return;
    };
    if msg_type.has_seid() != h.seid.is_some() {
        log::error!("[{}] Wrong S flag for {}", node, msg_type.name());
        return;
    }
    let Some(tx) = sock_for(ctx, socks, &node) else {
        return;
    };

    if msg_type.is_request() {
        let xid = match ctx.pfcp.xacts.receive_request(node, &h, tx) {
            Ok(RequestDisposition::New(xid)) => xid,
            Ok(RequestDisposition::Duplicate) => return,
            Err(e) => {
                log::error!("[{}] receive_request() failed: {}", node, e);
                return;
            }
        };
        let inbound = Inbound::Request {
            xid,
            header: h,
            body,
        };
        node_event(ctx, socks, node, PfcpSmEvent::Request(msg_type), Some(inbound), now);

        // Nothing was sent; keep no state for an unanswered request
        let unanswered = ctx
            .pfcp
            .xacts
            .get(xid)
            .is_some_and(|x| matches!(x.state, XactState::Initial | XactState::Staged));
        if unanswered {
            ctx.pfcp.xacts.remove(xid);
        }
    } else {
        let xact = match ctx.pfcp.xacts.match_response(node, &h) {
            Ok(xact) => xact,
            Err(e) => {
                log::warn!("[{}] {}", node, e);
                return;
            }
        };
        let accepted = match msg_type {
            PfcpMessageType::AssociationSetupResponse => {
                n4_handler::handle_association_setup_response(ctx, node, body.clone())
            }
            _ => true,
        };
        let inbound = Inbound::Response {
            data: xact.data,
            header: h,
            body,
        };
        node_event(
            ctx,
            socks,
            node,
            PfcpSmEvent::Response { msg_type, accepted },
            Some(inbound),
            now,
        );
    }
}

fn xact_timer<S: PfcpSend>(ctx: &mut UpfContext, socks: &[S], xid: XactId, now: Instant) {
    let Some(node) = ctx.pfcp.xacts.get(xid).map(|x| x.node) else {
        return;
    };
    let Some(tx) = sock_for(ctx, socks, &node) else {
        return;
    };
    let Some(timeout) = ctx.pfcp.xacts.on_timer(xid, tx, now) else {
        return;
    };

    match timeout.data {
        XactData::SessionReport(_) => {
            pfcp_path::sess_timeout(ctx, &timeout);
        }
        XactData::Heartbeat => {
            log::warn!("[{}] No Heartbeat Response", node);
            dispatch(ctx, socks, UpfEvent::N4NoHeartbeat(node), now);
        }
        XactData::AssociationSetup => {
            log::warn!("[{}] No Association Setup Response", node);
        }
        XactData::None => log::debug!("[{}] {}", node, timeout.error()),
    }
}

fn node_event<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    addr: SocketAddr,
    event: PfcpSmEvent,
    inbound: Option<Inbound>,
    now: Instant,
) {
    let max_retries = ctx.timers.association_max_retries();
    let Some(node) = ctx.pfcp.nodes.find(&addr) else {
        log::error!("[{}] No PFCP node", addr);
        return;
    };
    let result = pfcp_sm::dispatch(node, max_retries, event);
    apply(ctx, socks, addr, result, inbound.as_ref(), now);
}

fn apply<S: PfcpSend>(
    ctx: &mut UpfContext,
    socks: &[S],
    addr: SocketAddr,
    result: PfcpSmResult,
    inbound: Option<&Inbound>,
    now: Instant,
) {
    let Some(node) = ctx.pfcp.nodes.find_mut(&addr) else {
        return;
    };
    if node.state != result.state {
        log::info!("[{}] PFCP state {:?} -> {:?}", addr, node.state, result.state);
        if result.state == PfcpState::Associated {
            node.association_attempts = 0;
            node.unreachable = false;
        }
    }
    node.state = result.state;
    let tx: Option<&dyn PfcpSend> = socks.get(node.sock).map(|s| s as &dyn PfcpSend);

    for action in result.actions {
        if let Err(e) = run_action(ctx, tx, addr, action, inbound, now) {
            log::error!("[{}] {:?} failed: {}", addr, action, e);
        }
    }
}

fn run_action(
    ctx: &mut UpfContext,
    tx: Option<&dyn PfcpSend>,
    addr: SocketAddr,
    action: PfcpAction,
    inbound: Option<&Inbound>,
    now: Instant,
) -> PfcpResult<()> {
    match action {
        PfcpAction::StartAssociationTimer => {
            let timer = NodeTimer::Association(addr);
            ctx.pfcp.nodes.start_timer(timer, ctx.timers.duration(timer), now);
        }
        PfcpAction::StopAssociationTimer => {
            ctx.pfcp.nodes.stop_timer(NodeTimer::Association(addr));
        }
        PfcpAction::StartNoHeartbeatTimer => {
            let timer = NodeTimer::NoHeartbeat(addr);
            ctx.pfcp.nodes.start_timer(timer, ctx.timers.duration(timer), now);
        }
        PfcpAction::StopNoHeartbeatTimer => {
            ctx.pfcp.nodes.stop_timer(NodeTimer::NoHeartbeat(addr));
        }
        PfcpAction::MarkUnreachable => {
            if let Some(node) = ctx.pfcp.nodes.find_mut(&addr) {
                node.unreachable = true;
            }
        }
        PfcpAction::NodeLost => {
            let sessions = ctx.sess_remove_all_for_node(&addr);
            let xacts = ctx.pfcp.xacts.remove_node(&addr);
            log::warn!(
                "[{}] PFCP association lost ({} session(s), {} transaction(s) removed)",
                addr,
                sessions,
                xacts
            );
        }
        PfcpAction::SendAssociationSetupRequest => {
            if let Some(node) = ctx.pfcp.nodes.find_mut(&addr) {
                node.association_attempts += 1;
            }
            let tx = tx.ok_or(ogs_pfcp::PfcpError::NodeNotFound(addr))?;
            pfcp_path::send_association_setup_request(ctx, tx, addr, now)?;
        }
        PfcpAction::SendHeartbeatRequest => {
            let sent = tx
                .ok_or(ogs_pfcp::PfcpError::NodeNotFound(addr))
                .and_then(|tx| pfcp_path::send_heartbeat_request(ctx, tx, addr, now));
            if let Err(e) = sent {
                // No transaction to time out; try again next interval
                let timer = NodeTimer::NoHeartbeat(addr);
                ctx.pfcp.nodes.start_timer(timer, ctx.timers.duration(timer), now);
                return Err(e);
            }
        }
        PfcpAction::HandleHeartbeatResponse => {
            if let Some(Inbound::Response { body, .. }) = inbound {
                n4_handler::handle_heartbeat_response(ctx, addr, body.clone());
            }
        }
        PfcpAction::HandleSessionReportResponse => {
            if let Some(Inbound::Response { data, header, body }) = inbound {
                n4_handler::handle_session_report_response(ctx, *data, header, body.clone());
            }
        }
        PfcpAction::HandleHeartbeatRequest
        | PfcpAction::HandleAssociationSetupRequest
        | PfcpAction::HandleAssociationReleaseRequest
        | PfcpAction::HandleSessionEstablishmentRequest
        | PfcpAction::HandleSessionModificationRequest
        | PfcpAction::HandleSessionDeletionRequest => {
            let Some(Inbound::Request { xid, header, body }) = inbound else {
                log::error!("[{}] {:?} without a request", addr, action);
                return Ok(());
            };
            let tx = tx.ok_or(ogs_pfcp::PfcpError::NodeNotFound(addr))?;
            handle_request(ctx, tx, addr, action, *xid, header, body.clone(), now)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_request(
    ctx: &mut UpfContext,
    tx: &dyn PfcpSend,
    addr: SocketAddr,
    action: PfcpAction,
    xid: XactId,
    header: &PfcpHeader,
    body: Bytes,
    now: Instant,
) -> PfcpResult<()> {
    match action {
        PfcpAction::HandleHeartbeatRequest => {
            n4_handler::handle_heartbeat_request(ctx, tx, addr, xid, body, now)
        }
        PfcpAction::HandleAssociationSetupRequest => {
            n4_handler::handle_association_setup_request(ctx, tx, addr, xid, body, now)
        }
        PfcpAction::HandleAssociationReleaseRequest => {
            n4_handler::handle_association_release_request(ctx, tx, addr, xid, now)
        }
        PfcpAction::HandleSessionEstablishmentRequest => {
            n4_handler::handle_session_establishment_request(ctx, tx, addr, xid, body, now)
                .map(drop)
        }
        PfcpAction::HandleSessionModificationRequest => {
            n4_handler::handle_session_modification_request(ctx, tx, xid, header, body, now)
                .map(drop)
        }
        PfcpAction::HandleSessionDeletionRequest => {
            n4_handler::handle_session_deletion_request(ctx, tx, xid, header, now).map(drop)
        }
        _ => Ok(()),
    }
}
