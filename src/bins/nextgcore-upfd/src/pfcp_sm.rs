//! UPF PFCP State Machine
//!
//! Per-node association state machine. [`dispatch`] is a pure transition
//! function: it returns the next state and the actions to run, and the
//! caller (`upf_sm`) performs the I/O and timer work.
//!
//! ```text
//! Uninitialized --Entry--> Initial --> Associating <--> Associated
//!                                          any --Final--> Final
//! ```

use ogs_pfcp::{PfcpMessageType, PfcpNode, PfcpState};

/// Input to the node state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfcpSmEvent {
    /// Node created
    Entry,
    /// Node torn down
    Final,
    AssociationTimer,
    NoHeartbeatTimer,
    /// New request from the peer, duplicates already filtered
    Request(PfcpMessageType),
    /// Response matched to one of our requests
    Response {
        msg_type: PfcpMessageType,
        accepted: bool,
    },
    /// Heartbeat went unanswered
    NoHeartbeat,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfcpAction {
    SendAssociationSetupRequest,
    StartAssociationTimer,
    StopAssociationTimer,
    StartNoHeartbeatTimer,
    StopNoHeartbeatTimer,
    SendHeartbeatRequest,
    /// Association retries exhausted
    MarkUnreachable,
    HandleHeartbeatRequest,
    HandleHeartbeatResponse,
    HandleAssociationSetupRequest,
    HandleAssociationReleaseRequest,
    HandleSessionEstablishmentRequest,
    HandleSessionModificationRequest,
    HandleSessionDeletionRequest,
    HandleSessionReportResponse,
    /// Association lost: drop the node's sessions and transactions
    NodeLost,
}

/// Result of PFCP state machine dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpSmResult {
    pub state: PfcpState,
    pub actions: Vec<PfcpAction>,
}

impl PfcpSmResult {
    fn stay(state: PfcpState) -> Self {
        Self {
            state,
            actions: Vec::new(),
        }
    }

    fn with(state: PfcpState, actions: Vec<PfcpAction>) -> Self {
        Self { state, actions }
    }
}

/// Run one event through the node state machine
pub fn dispatch(node: &PfcpNode, max_retries: u32, event: PfcpSmEvent) -> PfcpSmResult {
    log::debug!(
        "[{}] PFCP SM: {:?} in state {:?}",
        node.addr,
        event,
        node.state
    );

    match node.state {
        _ if event == PfcpSmEvent::Final => state_final(node),
        PfcpState::Uninitialized => state_uninitialized(node, event),
        PfcpState::Initial => {
            let mut result = PfcpSmResult::stay(PfcpState::Initial);
            enter_associating(node, &mut result);
            result
        }
        PfcpState::Associating => state_associating(node, max_retries, event),
        PfcpState::Associated => state_associated(node, event),
        PfcpState::Final => {
            log::debug!("[{}] event {:?} after final", node.addr, event);
            PfcpSmResult::stay(PfcpState::Final)
        }
    }
}

fn enter_associating(node: &PfcpNode, result: &mut PfcpSmResult) {
    result.state = PfcpState::Associating;
    if node.self_initiate {
        result.actions.push(PfcpAction::SendAssociationSetupRequest);
        result.actions.push(PfcpAction::StartAssociationTimer);
    }
}

fn enter_associated(node: &PfcpNode, result: &mut PfcpSmResult) {
    if node.self_initiate {
        result.actions.push(PfcpAction::StopAssociationTimer);
    }
    result.state = PfcpState::Associated;
    result.actions.push(PfcpAction::StartNoHeartbeatTimer);
}

fn state_uninitialized(node: &PfcpNode, event: PfcpSmEvent) -> PfcpSmResult {
    match event {
        PfcpSmEvent::Entry => {
            let mut result = PfcpSmResult::stay(PfcpState::Initial);
            enter_associating(node, &mut result);
            result
        }
        _ => {
            log::warn!("[{}] Unexpected event {:?} before init", node.addr, event);
            PfcpSmResult::stay(PfcpState::Uninitialized)
        }
    }
}

fn state_final(node: &PfcpNode) -> PfcpSmResult {
    match node.state {
        PfcpState::Final => PfcpSmResult::stay(PfcpState::Final),
        PfcpState::Associated => PfcpSmResult::with(
            PfcpState::Final,
            vec![PfcpAction::StopNoHeartbeatTimer],
        ),
        PfcpState::Associating if node.self_initiate => PfcpSmResult::with(
            PfcpState::Final,
            vec![PfcpAction::StopAssociationTimer],
        ),
        _ => PfcpSmResult::stay(PfcpState::Final),
    }
}

fn state_associating(node: &PfcpNode, max_retries: u32, event: PfcpSmEvent) -> PfcpSmResult {
    let mut result = PfcpSmResult::stay(PfcpState::Associating);
    match event {
        PfcpSmEvent::Entry => {}
        PfcpSmEvent::AssociationTimer => {
            if !node.self_initiate {
                log::error!("[{}] Association timer on a passive node", node.addr);
            } else if max_retries > 0 && node.association_attempts >= max_retries {
                log::error!(
                    "[{}] No association after {} attempts, giving up",
                    node.addr,
                    node.association_attempts
                );
                result.actions.push(PfcpAction::MarkUnreachable);
                result.actions.push(PfcpAction::StopAssociationTimer);
            } else {
                log::warn!("[{}] Retry association", node.addr);
                result.actions.push(PfcpAction::SendAssociationSetupRequest);
                result.actions.push(PfcpAction::StartAssociationTimer);
            }
        }
        PfcpSmEvent::Request(PfcpMessageType::HeartbeatRequest) => {
            result.actions.push(PfcpAction::HandleHeartbeatRequest);
        }
        PfcpSmEvent::Response {
            msg_type: PfcpMessageType::HeartbeatResponse,
            ..
        } => {
            result.actions.push(PfcpAction::HandleHeartbeatResponse);
        }
        PfcpSmEvent::Request(PfcpMessageType::AssociationSetupRequest) => {
            result.actions.push(PfcpAction::HandleAssociationSetupRequest);
            enter_associated(node, &mut result);
        }
        PfcpSmEvent::Response {
            msg_type: PfcpMessageType::AssociationSetupResponse,
            accepted,
        } => {
            if accepted {
                enter_associated(node, &mut result);
            } else {
                log::warn!("[{}] Association setup rejected", node.addr);
            }
        }
        PfcpSmEvent::Request(PfcpMessageType::AssociationReleaseRequest) => {
            result.actions.push(PfcpAction::HandleAssociationReleaseRequest);
        }
        PfcpSmEvent::Request(msg_type) | PfcpSmEvent::Response { msg_type, .. } => {
            log::warn!(
                "[{}] cannot handle PFCP message type[{}] while associating",
                node.addr,
                msg_type as u8
            );
        }
        PfcpSmEvent::NoHeartbeatTimer | PfcpSmEvent::NoHeartbeat => {
            log::debug!("[{}] {:?} ignored while associating", node.addr, event);
        }
        PfcpSmEvent::Final => return state_final(node),
    }
    result
}

fn lose_association(node: &PfcpNode, result: &mut PfcpSmResult) {
    result.actions.push(PfcpAction::StopNoHeartbeatTimer);
    result.actions.push(PfcpAction::NodeLost);
    enter_associating(node, result);
}

fn state_associated(node: &PfcpNode, event: PfcpSmEvent) -> PfcpSmResult {
    let mut result = PfcpSmResult::stay(PfcpState::Associated);
    match event {
        PfcpSmEvent::Entry => {}
        PfcpSmEvent::NoHeartbeatTimer => {
            result.actions.push(PfcpAction::SendHeartbeatRequest);
        }
        PfcpSmEvent::NoHeartbeat => {
            log::warn!("[{}] No Heartbeat from the peer", node.addr);
            lose_association(node, &mut result);
        }
        PfcpSmEvent::Request(PfcpMessageType::HeartbeatRequest) => {
            result.actions.push(PfcpAction::HandleHeartbeatRequest);
            result.actions.push(PfcpAction::StartNoHeartbeatTimer);
        }
        PfcpSmEvent::Response {
            msg_type: PfcpMessageType::HeartbeatResponse,
            ..
        } => {
            result.actions.push(PfcpAction::HandleHeartbeatResponse);
            result.actions.push(PfcpAction::StartNoHeartbeatTimer);
        }
        PfcpSmEvent::Request(PfcpMessageType::AssociationSetupRequest) => {
            log::warn!("[{}] Re-association requested", node.addr);
            result.actions.push(PfcpAction::HandleAssociationSetupRequest);
            result.actions.push(PfcpAction::StartNoHeartbeatTimer);
        }
        PfcpSmEvent::Response {
            msg_type: PfcpMessageType::AssociationSetupResponse,
            ..
        } => {
            log::warn!("[{}] Association setup response while associated", node.addr);
        }
        PfcpSmEvent::Request(PfcpMessageType::AssociationReleaseRequest) => {
            log::info!("[{}] Association released by the peer", node.addr);
            result.actions.push(PfcpAction::HandleAssociationReleaseRequest);
            lose_association(node, &mut result);
        }
        PfcpSmEvent::Request(PfcpMessageType::SessionEstablishmentRequest) => {
            result.actions.push(PfcpAction::HandleSessionEstablishmentRequest);
        }
        PfcpSmEvent::Request(PfcpMessageType::SessionModificationRequest) => {
            result.actions.push(PfcpAction::HandleSessionModificationRequest);
        }
        PfcpSmEvent::Request(PfcpMessageType::SessionDeletionRequest) => {
            result.actions.push(PfcpAction::HandleSessionDeletionRequest);
        }
        PfcpSmEvent::Response {
            msg_type: PfcpMessageType::SessionReportResponse,
            ..
        } => {
            result.actions.push(PfcpAction::HandleSessionReportResponse);
        }
        PfcpSmEvent::Request(msg_type) | PfcpSmEvent::Response { msg_type, .. } => {
            log::error!(
                "[{}] Not implemented PFCP message type[{}]",
                node.addr,
                msg_type as u8
            );
        }
        PfcpSmEvent::AssociationTimer => {
            log::debug!("[{}] association timer ignored while associated", node.addr);
        }
        PfcpSmEvent::Final => return state_final(node),
    }
    result
}
