//! PFCP Node Registry
//!
//! One [`PfcpNode`] per peer transport address. The registry owns the nodes
//! and their association and heartbeat timers; transactions and sessions
//! refer to a node by its address only.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ogs_core::{TimerId, TimerMgr};

use crate::types::NodeId;

/// Association state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PfcpState {
    #[default]
    Uninitialized,
    Initial,
    Associating,
    Associated,
    Final,
}

/// Node timer payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTimer {
    /// Periodic association retry, self-initiating nodes only
    Association(SocketAddr),
    /// Heartbeat interval while associated
    NoHeartbeat(SocketAddr),
}

impl NodeTimer {
    pub fn addr(&self) -> SocketAddr {
        match self {
            NodeTimer::Association(addr) | NodeTimer::NoHeartbeat(addr) => *addr,
        }
    }
}

#[derive(Debug)]
pub struct PfcpNode {
    pub addr: SocketAddr,
    /// Index of the local socket this peer is reached through
    pub sock: usize,
    pub state: PfcpState,
    /// The local side drives association setup towards this node
    pub self_initiate: bool,
    /// Peer Node ID learned from association setup
    pub node_id: Option<NodeId>,
    pub remote_recovery: Option<u32>,
    /// Association attempts since the last success
    pub association_attempts: u32,
    /// Association retries exhausted; the node is kept but no longer polled
    pub unreachable: bool,
    t_association: Option<TimerId>,
    t_no_heartbeat: TimerId,
}

impl PfcpNode {
    pub fn is_associated(&self) -> bool {
        self.state == PfcpState::Associated
    }
}

/// Peer registry keyed by transport address
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<SocketAddr, PfcpNode>,
    timers: TimerMgr<NodeTimer>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, addr: &SocketAddr) -> Option<&PfcpNode> {
        self.nodes.get(addr)
    }

    pub fn find_mut(&mut self, addr: &SocketAddr) -> Option<&mut PfcpNode> {
        self.nodes.get_mut(addr)
    }

    /// Add a node in `Initial` state. A node that will self-initiate gets an
    /// association timer; it is armed later by the state machine.
    pub fn add(&mut self, addr: SocketAddr, sock: usize, self_initiate: bool) -> &mut PfcpNode {
        let Self { nodes, timers } = self;
        nodes
            .entry(addr)
            .or_insert_with(|| new_node(timers, addr, sock, self_initiate))
    }

    /// Return the node for `addr`, creating it on first contact with
    /// self-initiation disabled. The flag reports whether it was created.
    pub fn find_or_create(&mut self, addr: SocketAddr, sock: usize) -> (&mut PfcpNode, bool) {
        let Self { nodes, timers } = self;
        match nodes.entry(addr) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(new_node(timers, addr, sock, false)), true),
        }
    }

    pub fn start_timer(&mut self, timer: NodeTimer, duration: Duration, now: Instant) {
        if let Some(id) = self.timer_id(timer) {
            self.timers.start(id, duration, now);
        }
    }

    pub fn stop_timer(&mut self, timer: NodeTimer) {
        if let Some(id) = self.timer_id(timer) {
            self.timers.stop(id);
        }
    }

    pub fn is_timer_running(&self, timer: NodeTimer) -> bool {
        self.timer_id(timer)
            .map(|id| self.timers.is_running(id))
            .unwrap_or(false)
    }

    fn timer_id(&self, timer: NodeTimer) -> Option<TimerId> {
        let node = self.nodes.get(&timer.addr())?;
        match timer {
            NodeTimer::Association(_) => node.t_association,
            NodeTimer::NoHeartbeat(_) => Some(node.t_no_heartbeat),
        }
    }

    /// Finalize and drop a node: its timers are deleted before it goes.
    /// Finalizing an absent node is a no-op.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<PfcpNode> {
        let mut node = self.nodes.remove(addr)?;
        if let Some(id) = node.t_association.take() {
            self.timers.delete(id);
        }
        self.timers.delete(node.t_no_heartbeat);
        node.state = PfcpState::Final;
        log::debug!("[{}] PFCP node removed", addr);
        Some(node)
    }

    /// Finalize every node, returning the addresses removed
    pub fn remove_all(&mut self) -> Vec<SocketAddr> {
        let addrs: Vec<SocketAddr> = self.nodes.keys().copied().collect();
        for addr in &addrs {
            self.remove(addr);
        }
        addrs
    }

    pub fn iter(&self) -> impl Iterator<Item = &PfcpNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn expire(&mut self, now: Instant) -> Vec<NodeTimer> {
        self.timers
            .expire(now)
            .into_iter()
            .map(|(_, timer)| timer)
            .collect()
    }

    /// Running timers across all nodes
    pub fn running_timers(&self) -> usize {
        self.timers.count()
    }
}

fn new_node(
    timers: &mut TimerMgr<NodeTimer>,
    addr: SocketAddr,
    sock: usize,
    self_initiate: bool,
) -> PfcpNode {
    log::debug!("[{}] PFCP node added", addr);
    PfcpNode {
        addr,
        sock,
        state: PfcpState::Initial,
        self_initiate,
        node_id: None,
        remote_recovery: None,
        association_attempts: 0,
        unreachable: false,
        t_association: self_initiate.then(|| timers.add(NodeTimer::Association(addr))),
        t_no_heartbeat: timers.add(NodeTimer::NoHeartbeat(addr)),
    }
}
