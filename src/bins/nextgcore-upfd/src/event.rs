//! UPF Event Definitions
//!
//! Events decouple datagram reception from processing. The listener and
//! the user plane push events; the main loop pops and dispatches them one
//! at a time.

use std::net::SocketAddr;

use bytes::Bytes;
use ogs_pfcp::message::UserPlaneReport;
use ogs_pfcp::PfcpTimer;
use tokio::sync::mpsc;

use crate::context::SessId;

#[derive(Debug)]
pub enum UpfEvent {
    /// Datagram from a known node, header included
    N4Message { node: SocketAddr, pkbuf: Bytes },
    N4Timer(PfcpTimer),
    /// Heartbeat to the node went unanswered
    N4NoHeartbeat(SocketAddr),
    /// User plane asks for a Session Report Request
    SessionReport {
        sess_id: SessId,
        report: UserPlaneReport,
    },
}

impl UpfEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UpfEvent::N4Message { .. } => "UPF_EVT_N4_MESSAGE",
            UpfEvent::N4Timer(_) => "UPF_EVT_N4_TIMER",
            UpfEvent::N4NoHeartbeat(_) => "UPF_EVT_N4_NO_HEARTBEAT",
            UpfEvent::SessionReport { .. } => "UPF_EVT_SESSION_REPORT",
        }
    }
}

/// Producer side of the event queue
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<UpfEvent>,
}

impl EventQueue {
    pub fn new(size: usize) -> (Self, mpsc::Receiver<UpfEvent>) {
        let (tx, rx) = mpsc::channel(size.max(1));
        (Self { tx }, rx)
    }

    /// Push without waiting. A full or closed queue drops the event and
    /// the buffer it carries.
    pub fn push(&self, event: UpfEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                log::error!("queue push failed: {}", e);
                false
            }
        }
    }
}
