//! PFCP Transaction Manager
//!
//! Tracks every in-flight request/response exchange per node.
//!
//! A *local* transaction is a request we originate: it gets a fresh
//! sequence number, is retransmitted every `t3_response` and times out
//! after `n3_response` transmissions. A *remote* transaction mirrors a
//! request received from a peer: its response is sent once and held for
//! `holding` so a retransmitted request is answered from the cache.
//!
//! Timeouts and completions are returned by value, which makes each of
//! them observable exactly once.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ogs_core::{TimerId, TimerMgr};

use crate::error::{PfcpError, PfcpResult};
use crate::header::{build_message, is_request_type, PfcpHeader};
use crate::path::{send_datagram, PfcpSend};
use crate::types::PFCP_MAX_SEQUENCE;

/// Transaction handle. Never reused, so a stale handle simply misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XactId(u64);

impl fmt::Display for XactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XID:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactState {
    /// Created, nothing staged
    Initial,
    /// Datagram staged, not sent
    Staged,
    /// Request sent, waiting for the response
    Pending,
    /// Request resent at least once
    Retransmitting,
    /// Response sent, kept for duplicate requests
    Holding,
    Completed,
    TimedOut,
}

/// Retransmission and capacity limits
#[derive(Debug, Clone)]
pub struct XactConfig {
    pub t3_response: Duration,
    /// Total transmissions of a local request before it times out
    pub n3_response: u32,
    pub holding: Duration,
    /// Upper bound of the sequence namespace, inclusive
    pub max_sequence: u32,
    /// Outstanding transactions per node and direction
    pub max_per_node: usize,
}

impl Default for XactConfig {
    fn default() -> Self {
        XactConfig {
            t3_response: Duration::from_secs(3),
            n3_response: 3,
            holding: Duration::from_secs(9),
            max_sequence: PFCP_MAX_SEQUENCE,
            max_per_node: 64,
        }
    }
}

#[derive(Debug)]
pub struct PfcpXact<D> {
    pub id: XactId,
    pub node: SocketAddr,
    pub origin: XactOrigin,
    pub sequence_number: u32,
    /// Type of the request this exchange started with
    pub message_type: u8,
    pub state: XactState,
    /// Transmissions so far
    pub attempts: u32,
    /// Application context handed back on completion or timeout
    pub data: D,
    staged: Option<Bytes>,
    timer: Option<TimerId>,
}

impl<D> PfcpXact<D> {
    /// The datagram last staged for (re)transmission
    pub fn staged(&self) -> Option<&Bytes> {
        self.staged.as_ref()
    }
}

/// A local transaction that ran out of retransmissions
#[derive(Debug)]
pub struct XactTimeout<D> {
    pub id: XactId,
    pub node: SocketAddr,
    pub message_type: u8,
    pub sequence_number: u32,
    pub data: D,
}

impl<D> XactTimeout<D> {
    pub fn error(&self) -> PfcpError {
        PfcpError::TransactionTimeout {
            message_type: self.message_type,
            sequence_number: self.sequence_number,
        }
    }
}

/// Outcome of an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    /// First copy; the request must be processed
    New(XactId),
    /// Retransmitted copy; answered from cache or still being processed
    Duplicate,
}

#[derive(Debug, Default)]
struct NodeXacts {
    last_sequence: u32,
    local: HashMap<u32, XactId>,
    remote: HashMap<u32, XactId>,
}

pub struct XactManager<D> {
    config: XactConfig,
    xacts: HashMap<XactId, PfcpXact<D>>,
    nodes: HashMap<SocketAddr, NodeXacts>,
    timers: TimerMgr<XactId>,
    next_id: u64,
}

impl<D> XactManager<D> {
    pub fn new(config: XactConfig) -> Self {
        XactManager {
            config,
            xacts: HashMap::new(),
            nodes: HashMap::new(),
            timers: TimerMgr::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &XactConfig {
        &self.config
    }

    fn alloc_id(&mut self) -> XactId {
        let id = XactId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a locally-initiated transaction towards `node`. The sequence
    /// number is the next free one after the last allocated for that node.
    pub fn local_create(&mut self, node: SocketAddr, data: D) -> PfcpResult<XactId> {
        let max_sequence = self.config.max_sequence.max(1);
        let max_per_node = self.config.max_per_node;
        let per_node = self.nodes.entry(node).or_default();

        if per_node.local.len() >= max_per_node {
            log::error!("[{}] No free transaction ({} outstanding)", node, per_node.local.len());
            return Err(PfcpError::ResourceExhausted("transaction"));
        }

        let mut candidate = per_node.last_sequence;
        let mut sequence_number = None;
        for _ in 0..max_sequence {
            candidate = if candidate >= max_sequence { 1 } else { candidate + 1 };
            if !per_node.local.contains_key(&candidate) {
                sequence_number = Some(candidate);
                break;
            }
        }
        let Some(sequence_number) = sequence_number else {
            log::error!("[{}] Sequence number space exhausted", node);
            return Err(PfcpError::ResourceExhausted("sequence number"));
        };
        per_node.last_sequence = sequence_number;

        let id = self.alloc_id();
        self.nodes
            .entry(node)
            .or_default()
            .local
            .insert(sequence_number, id);
        self.xacts.insert(
            id,
            PfcpXact {
                id,
                node,
                origin: XactOrigin::Local,
                sequence_number,
                message_type: 0,
                state: XactState::Initial,
                attempts: 0,
                data,
                staged: None,
                timer: None,
            },
        );
        log::debug!("[{}] LOCAL Create peer [{}] sqn {}", id, node, sequence_number);
        Ok(id)
    }

    /// Stage the datagram `header + body`. The header's sequence number is
    /// overwritten with the transaction's own.
    pub fn update_tx(&mut self, id: XactId, header: &PfcpHeader, body: &[u8]) -> PfcpResult<()> {
        let xact = self.xacts.get_mut(&id).ok_or(PfcpError::XactNotFound)?;
        match xact.state {
            XactState::Initial | XactState::Staged => {}
            XactState::Completed | XactState::TimedOut => {
                return Err(PfcpError::InvalidState("transaction already finished"))
            }
            _ => return Err(PfcpError::InvalidState("transaction already committed")),
        }

        let request = is_request_type(header.message_type);
        match xact.origin {
            XactOrigin::Local if !request => {
                return Err(PfcpError::InvalidState("local transaction must send a request"))
            }
            XactOrigin::Remote if request => {
                return Err(PfcpError::InvalidState("remote transaction must send a response"))
            }
            XactOrigin::Local => xact.message_type = header.message_type,
            XactOrigin::Remote => {}
        }

        let mut h = header.clone();
        h.sequence_number = xact.sequence_number;
        xact.staged = Some(build_message(&h, body));
        xact.state = XactState::Staged;
        log::trace!("[{}] update_tx type {} sqn {}", id, h.message_type, h.sequence_number);
        Ok(())
    }

    /// Send the staged datagram and arm the transaction timer. On a send
    /// failure nothing is armed and the transaction stays staged.
    pub fn commit(&mut self, id: XactId, tx: &dyn PfcpSend, now: Instant) -> PfcpResult<()> {
        let xact = self.xacts.get_mut(&id).ok_or(PfcpError::XactNotFound)?;
        if xact.state != XactState::Staged {
            return Err(PfcpError::InvalidState("nothing staged"));
        }
        let buf = xact
            .staged
            .as_ref()
            .ok_or(PfcpError::InvalidState("nothing staged"))?;

        send_datagram(tx, buf, xact.node)?;
        xact.attempts = 1;

        let (state, duration) = match xact.origin {
            XactOrigin::Local => (XactState::Pending, self.config.t3_response),
            XactOrigin::Remote => (XactState::Holding, self.config.holding),
        };
        xact.state = state;
        let timer = *xact.timer.get_or_insert_with(|| self.timers.add(id));
        self.timers.start(timer, duration, now);
        log::debug!("[{}] commit peer [{}] sqn {}", id, xact.node, xact.sequence_number);
        Ok(())
    }

    /// Handle a transaction timer. Local requests are retransmitted up to `n3`
    /// times, then reported as timed out and removed. Remote
    /// transactions are removed when the holding time ends.
    pub fn on_timer(&mut self, id: XactId, tx: &dyn PfcpSend, now: Instant) -> Option<XactTimeout<D>> {
        let xact = self.xacts.get_mut(&id)?;
        match (xact.origin, xact.state) {
            (XactOrigin::Local, XactState::Pending | XactState::Retransmitting) => {
                if xact.attempts < self.config.n3_response {
                    xact.attempts += 1;
                    xact.state = XactState::Retransmitting;
                    log::debug!(
                        "[{}] retransmit peer [{}] sqn {} attempt {}",
                        id, xact.node, xact.sequence_number, xact.attempts
                    );
                    if let Some(buf) = xact.staged.as_ref() {
                        if let Err(e) = send_datagram(tx, buf, xact.node) {
                            log::error!("[{}] retransmit failed: {}", id, e);
                        }
                    }
                    if let Some(timer) = xact.timer {
                        self.timers.start(timer, self.config.t3_response, now);
                    }
                    None
                } else {
                    log::warn!(
                        "[{}] No response peer [{}] type {} sqn {}",
                        id, xact.node, xact.message_type, xact.sequence_number
                    );
                    let mut xact = self.remove(id)?;
                    xact.state = XactState::TimedOut;
                    Some(XactTimeout {
                        id,
                        node: xact.node,
                        message_type: xact.message_type,
                        sequence_number: xact.sequence_number,
                        data: xact.data,
                    })
                }
            }
            (XactOrigin::Remote, XactState::Holding) => {
                log::trace!("[{}] holding time over", id);
                self.remove(id);
                None
            }
            (_, state) => {
                log::warn!("[{}] timer in state {:?}", id, state);
                None
            }
        }
    }

    /// Match an inbound response to an outstanding local request. The
    /// transaction is completed, its timer cancelled, and ownership passes
    /// to the caller.
    pub fn match_response(&mut self, node: SocketAddr, header: &PfcpHeader) -> PfcpResult<PfcpXact<D>> {
        let stray = || PfcpError::StrayResponse {
            addr: node,
            message_type: header.message_type,
            sequence_number: header.sequence_number,
        };
        let id = self
            .nodes
            .get(&node)
            .and_then(|n| n.local.get(&header.sequence_number))
            .copied()
            .ok_or_else(stray)?;

        let xact = self.xacts.get(&id).ok_or_else(stray)?;
        let sent = matches!(xact.state, XactState::Pending | XactState::Retransmitting);
        if !sent || header.message_type != xact.message_type.wrapping_add(1) {
            return Err(stray());
        }

        let mut xact = self.remove(id).ok_or_else(stray)?;
        xact.state = XactState::Completed;
        log::debug!("[{}] completed peer [{}] sqn {}", id, node, header.sequence_number);
        Ok(xact)
    }

    /// Delete one transaction and cancel its timer
    pub fn remove(&mut self, id: XactId) -> Option<PfcpXact<D>> {
        let mut xact = self.xacts.remove(&id)?;
        if let Some(timer) = xact.timer.take() {
            self.timers.delete(timer);
        }
        if let Some(per_node) = self.nodes.get_mut(&xact.node) {
            match xact.origin {
                XactOrigin::Local => per_node.local.remove(&xact.sequence_number),
                XactOrigin::Remote => per_node.remote.remove(&xact.sequence_number),
            };
        }
        Some(xact)
    }

    /// Drop every transaction of `node` together with its timers
    pub fn remove_node(&mut self, node: &SocketAddr) -> usize {
        let Some(per_node) = self.nodes.remove(node) else {
            return 0;
        };
        let ids: Vec<XactId> = per_node
            .local
            .values()
            .chain(per_node.remote.values())
            .copied()
            .collect();
        for id in &ids {
            if let Some(mut xact) = self.xacts.remove(id) {
                if let Some(timer) = xact.timer.take() {
                    self.timers.delete(timer);
                }
            }
        }
        if !ids.is_empty() {
            log::info!("[{}] {} transaction(s) removed", node, ids.len());
        }
        ids.len()
    }

    pub fn get(&self, id: XactId) -> Option<&PfcpXact<D>> {
        self.xacts.get(&id)
    }

    pub fn get_mut(&mut self, id: XactId) -> Option<&mut PfcpXact<D>> {
        self.xacts.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.xacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xacts.is_empty()
    }

    /// Outstanding transactions of one node
    pub fn count(&self, node: &SocketAddr) -> usize {
        self.nodes
            .get(node)
            .map(|n| n.local.len() + n.remote.len())
            .unwrap_or(0)
    }

    /// Live local sequence numbers of one node
    pub fn local_sequences(&self, node: &SocketAddr) -> Vec<u32> {
        self.nodes
            .get(node)
            .map(|n| n.local.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Expired transaction timers; feed each id back through [`Self::on_timer`]
    pub fn expire(&mut self, now: Instant) -> Vec<XactId> {
        self.timers.expire(now).into_iter().map(|(_, id)| id).collect()
    }

    /// Running transaction timers
    pub fn running_timers(&self) -> usize {
        self.timers.count()
    }
}

impl<D: Default> XactManager<D> {
    /// Register an inbound request. A retransmitted request whose response
    /// is held gets the cached response again.
    pub fn receive_request(
        &mut self,
        node: SocketAddr,
        header: &PfcpHeader,
        tx: &dyn PfcpSend,
    ) -> PfcpResult<RequestDisposition> {
        let existing = self
            .nodes
            .get(&node)
            .and_then(|n| n.remote.get(&header.sequence_number))
            .copied();

        if let Some(id) = existing {
            if let Some(xact) = self.xacts.get(&id) {
                match (xact.state, xact.staged.as_ref()) {
                    (XactState::Holding, Some(buf)) => {
                        log::info!(
                            "[{}] Request duplicated, retransmit response sqn {}",
                            id, header.sequence_number
                        );
                        send_datagram(tx, buf, node)?;
                    }
                    _ => log::info!(
                        "[{}] Request duplicated, discard sqn {}",
                        id, header.sequence_number
                    ),
                }
            }
            return Ok(RequestDisposition::Duplicate);
        }

        let per_node = self.nodes.entry(node).or_default();
        if per_node.remote.len() >= self.config.max_per_node {
            log::error!("[{}] No free transaction for peer request", node);
            return Err(PfcpError::ResourceExhausted("transaction"));
        }

        let id = self.alloc_id();
        self.nodes
            .entry(node)
            .or_default()
            .remote
            .insert(header.sequence_number, id);
        self.xacts.insert(
            id,
            PfcpXact {
                id,
                node,
                origin: XactOrigin::Remote,
                sequence_number: header.sequence_number,
                message_type: header.message_type,
                state: XactState::Initial,
                attempts: 0,
                data: D::default(),
                staged: None,
                timer: None,
            },
        );
        log::debug!("[{}] REMOTE Create peer [{}] sqn {}", id, node, header.sequence_number);
        Ok(RequestDisposition::New(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::PfcpMessageType;
    use crate::path::mock::MockSend;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 4], 8805))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn config() -> XactConfig {
        XactConfig {
            t3_response: ms(100),
            n3_response: 3,
            holding: ms(300),
            max_sequence: PFCP_MAX_SEQUENCE,
            max_per_node: 8,
        }
    }

    fn report_request() -> PfcpHeader {
        PfcpHeader::new_with_seid(PfcpMessageType::SessionReportRequest, 42, 0)
    }

    fn send_local(mgr: &mut XactManager<u32>, tx: &MockSend, data: u32, now: Instant) -> XactId {
        let id = mgr.local_create(peer(), data).unwrap();
        mgr.update_tx(id, &report_request(), &[]).unwrap();
        mgr.commit(id, tx, now).unwrap();
        id
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut mgr: XactManager<()> = XactManager::new(config());
        let a = mgr.local_create(peer(), ()).unwrap();
        let b = mgr.local_create(peer(), ()).unwrap();
        assert_eq!(mgr.get(a).unwrap().sequence_number, 1);
        assert_eq!(mgr.get(b).unwrap().sequence_number, 2);

        let other = SocketAddr::from(([127, 0, 0, 5], 8805));
        let c = mgr.local_create(other, ()).unwrap();
        assert_eq!(mgr.get(c).unwrap().sequence_number, 1);
    }

    #[test]
    fn test_wraparound_skips_live_sequence() {
        let mut mgr: XactManager<()> = XactManager::new(XactConfig {
            max_sequence: 3,
            ..config()
        });
        let first = mgr.local_create(peer(), ()).unwrap();
        let second = mgr.local_create(peer(), ()).unwrap();
        mgr.local_create(peer(), ()).unwrap();
        mgr.remove(second);

        let next = mgr.local_create(peer(), ()).unwrap();
        assert_eq!(mgr.get(next).unwrap().sequence_number, 2);
        assert!(matches!(
            mgr.local_create(peer(), ()),
            Err(PfcpError::ResourceExhausted(_))
        ));

        mgr.remove(first);
        let again = mgr.local_create(peer(), ()).unwrap();
        assert_eq!(mgr.get(again).unwrap().sequence_number, 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut mgr: XactManager<()> = XactManager::new(XactConfig {
            max_per_node: 2,
            ..config()
        });
        mgr.local_create(peer(), ()).unwrap();
        mgr.local_create(peer(), ()).unwrap();
        assert!(matches!(
            mgr.local_create(peer(), ()),
            Err(PfcpError::ResourceExhausted("transaction"))
        ));
    }

    #[test]
    fn test_update_tx_rejects_response_on_local() {
        let mut mgr: XactManager<()> = XactManager::new(config());
        let id = mgr.local_create(peer(), ()).unwrap();
        let rsp = PfcpHeader::new(PfcpMessageType::HeartbeatResponse, 0);
        assert!(matches!(
            mgr.update_tx(id, &rsp, &[]),
            Err(PfcpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_commit_stamps_sequence_and_sends() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        let id = send_local(&mut mgr, &tx, 7, now);

        let sent = tx.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, peer());
        let mut raw = sent[0].0.clone();
        let h = PfcpHeader::decode(&mut raw).unwrap();
        assert_eq!(h.sequence_number, mgr.get(id).unwrap().sequence_number);
        assert_eq!(h.seid, Some(42));
        assert_eq!(mgr.get(id).unwrap().state, XactState::Pending);
        assert_eq!(mgr.next_deadline(), Some(now + ms(100)));
    }

    #[test]
    fn test_commit_failure_leaves_transaction_staged() {
        let now = Instant::now();
        let tx = MockSend::default();
        tx.fail.set(true);
        let mut mgr: XactManager<()> = XactManager::new(config());
        let id = mgr.local_create(peer(), ()).unwrap();
        mgr.update_tx(id, &report_request(), &[]).unwrap();

        assert!(matches!(mgr.commit(id, &tx, now), Err(PfcpError::TransmitError(_))));
        assert_eq!(mgr.get(id).unwrap().state, XactState::Staged);
        assert_eq!(mgr.running_timers(), 0);

        tx.fail.set(false);
        mgr.commit(id, &tx, now).unwrap();
        assert_eq!(tx.count(), 1);
    }

    #[test]
    fn test_update_tx_after_commit_is_invalid() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        let id = send_local(&mut mgr, &tx, 0, now);
        assert!(matches!(
            mgr.update_tx(id, &report_request(), &[]),
            Err(PfcpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_retransmit_then_timeout_once() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        let id = send_local(&mut mgr, &tx, 99, now);

        let mut timeouts = Vec::new();
        for step in 1..=5u64 {
            for expired in mgr.expire(now + ms(100 * step)) {
                if let Some(t) = mgr.on_timer(expired, &tx, now + ms(100 * step)) {
                    timeouts.push((step, t));
                }
            }
        }

        assert_eq!(tx.count(), 3);
        assert_eq!(timeouts.len(), 1);
        let (step, timeout) = &timeouts[0];
        assert_eq!(*step, 3);
        assert_eq!(timeout.id, id);
        assert_eq!(timeout.data, 99);
        assert_eq!(timeout.message_type, PfcpMessageType::SessionReportRequest as u8);
        assert!(mgr.get(id).is_none());
        assert!(mgr.local_sequences(&peer()).is_empty());
    }

    #[test]
    fn test_response_completes_once() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        let id = send_local(&mut mgr, &tx, 5, now);
        let sqn = mgr.get(id).unwrap().sequence_number;

        let rsp = PfcpHeader::new_with_seid(PfcpMessageType::SessionReportResponse, 1, sqn);
        let xact = mgr.match_response(peer(), &rsp).unwrap();
        assert_eq!(xact.id, id);
        assert_eq!(xact.data, 5);
        assert_eq!(xact.state, XactState::Completed);
        assert_eq!(mgr.running_timers(), 0);

        assert!(matches!(
            mgr.match_response(peer(), &rsp),
            Err(PfcpError::StrayResponse { .. })
        ));
        for expired in mgr.expire(now + ms(1000)) {
            assert!(mgr.on_timer(expired, &tx, now + ms(1000)).is_none());
        }
    }

    #[test]
    fn test_response_with_wrong_type_is_stray() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        let id = send_local(&mut mgr, &tx, 0, now);
        let sqn = mgr.get(id).unwrap().sequence_number;

        let rsp = PfcpHeader::new(PfcpMessageType::HeartbeatResponse, sqn);
        assert!(matches!(
            mgr.match_response(peer(), &rsp),
            Err(PfcpError::StrayResponse { .. })
        ));
        assert!(mgr.get(id).is_some());
    }

    #[test]
    fn test_remote_duplicate_resends_cached_response() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr: XactManager<()> = XactManager::new(config());
        let req = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 77);

        let RequestDisposition::New(id) = mgr.receive_request(peer(), &req, &tx).unwrap() else {
            panic!("expected a new transaction");
        };
        assert_eq!(
            mgr.receive_request(peer(), &req, &tx).unwrap(),
            RequestDisposition::Duplicate
        );
        assert_eq!(tx.count(), 0);

        let rsp = PfcpHeader::new(PfcpMessageType::HeartbeatResponse, 0);
        mgr.update_tx(id, &rsp, &[0, 96, 0, 4, 0, 0, 0, 1]).unwrap();
        mgr.commit(id, &tx, now).unwrap();
        assert_eq!(mgr.get(id).unwrap().state, XactState::Holding);

        assert_eq!(
            mgr.receive_request(peer(), &req, &tx).unwrap(),
            RequestDisposition::Duplicate
        );
        let sent = tx.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, sent[1].0);
        let h = PfcpHeader::decode(&mut sent[0].0.clone()).unwrap();
        assert_eq!(h.sequence_number, 77);
    }

    #[test]
    fn test_remote_holding_expires_silently() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr: XactManager<()> = XactManager::new(config());
        let req = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 1);
        let RequestDisposition::New(id) = mgr.receive_request(peer(), &req, &tx).unwrap() else {
            panic!("expected a new transaction");
        };
        mgr.update_tx(id, &PfcpHeader::new(PfcpMessageType::HeartbeatResponse, 0), &[])
            .unwrap();
        mgr.commit(id, &tx, now).unwrap();

        for expired in mgr.expire(now + ms(300)) {
            assert!(mgr.on_timer(expired, &tx, now + ms(300)).is_none());
        }
        assert!(mgr.is_empty());
        assert_eq!(tx.count(), 1);
    }

    #[test]
    fn test_remote_must_send_response() {
        let tx = MockSend::default();
        let mut mgr: XactManager<()> = XactManager::new(config());
        let req = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 1);
        let RequestDisposition::New(id) = mgr.receive_request(peer(), &req, &tx).unwrap() else {
            panic!("expected a new transaction");
        };
        assert!(matches!(
            mgr.update_tx(id, &req, &[]),
            Err(PfcpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_remove_node_cancels_everything() {
        let now = Instant::now();
        let tx = MockSend::default();
        let mut mgr = XactManager::new(config());
        send_local(&mut mgr, &tx, 1, now);
        send_local(&mut mgr, &tx, 2, now);
        let req = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 9);
        mgr.receive_request(peer(), &req, &tx).unwrap();

        assert_eq!(mgr.count(&peer()), 3);
        assert_eq!(mgr.remove_node(&peer()), 3);
        assert!(mgr.is_empty());
        assert_eq!(mgr.running_timers(), 0);
        assert!(mgr.expire(now + ms(10_000)).is_empty());
        assert_eq!(mgr.remove_node(&peer()), 0);
    }
}
