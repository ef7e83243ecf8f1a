//! PFCP Context
//!
//! Owns the node registry and the transaction manager and keeps them
//! consistent: a node never disappears while transactions still point
//! at it.

use std::net::SocketAddr;
use std::time::Instant;

use crate::node::{NodeRegistry, NodeTimer, PfcpNode};
use crate::xact::{XactConfig, XactId, XactManager};

/// Any timer owned by the PFCP context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfcpTimer {
    Node(NodeTimer),
    Xact(XactId),
}

pub struct PfcpContext<D> {
    pub nodes: NodeRegistry,
    pub xacts: XactManager<D>,
}

impl<D> PfcpContext<D> {
    pub fn new(xact_config: XactConfig) -> Self {
        PfcpContext {
            nodes: NodeRegistry::new(),
            xacts: XactManager::new(xact_config),
        }
    }

    /// Finalize a node: its transactions and every timer go with it.
    /// Repeated calls are no-ops.
    pub fn remove_node(&mut self, addr: &SocketAddr) -> Option<PfcpNode> {
        self.xacts.remove_node(addr);
        self.nodes.remove(addr)
    }

    /// Finalize every node
    pub fn remove_all(&mut self) -> Vec<SocketAddr> {
        let addrs = self.nodes.remove_all();
        for addr in &addrs {
            self.xacts.remove_node(addr);
        }
        addrs
    }

    /// Earliest deadline across node and transaction timers
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.nodes.next_deadline(), self.xacts.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn expire(&mut self, now: Instant) -> Vec<PfcpTimer> {
        let mut expired: Vec<PfcpTimer> = self
            .nodes
            .expire(now)
            .into_iter()
            .map(PfcpTimer::Node)
            .collect();
        expired.extend(self.xacts.expire(now).into_iter().map(PfcpTimer::Xact));
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{PfcpHeader, PfcpMessageType};
    use crate::path::mock::MockSend;
    use std::time::Duration;

    #[test]
    fn test_remove_node_cascades() {
        let now = Instant::now();
        let tx = MockSend::default();
        let peer = SocketAddr::from(([10, 0, 0, 1], 8805));
        let mut ctx: PfcpContext<()> = PfcpContext::new(XactConfig::default());

        ctx.nodes.add(peer, 0, true);
        ctx.nodes
            .start_timer(NodeTimer::Association(peer), Duration::from_secs(3), now);
        let id = ctx.xacts.local_create(peer, ()).unwrap();
        ctx.xacts
            .update_tx(id, &PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 0), &[])
            .unwrap();
        ctx.xacts.commit(id, &tx, now).unwrap();
        assert!(ctx.next_deadline().is_some());

        assert!(ctx.remove_node(&peer).is_some());
        assert!(ctx.xacts.is_empty());
        assert_eq!(ctx.next_deadline(), None);
        assert!(ctx.expire(now + Duration::from_secs(60)).is_empty());
        assert!(ctx.remove_node(&peer).is_none());
    }

    #[test]
    fn test_next_deadline_is_earliest() {
        let now = Instant::now();
        let tx = MockSend::default();
        let peer = SocketAddr::from(([10, 0, 0, 1], 8805));
        let mut ctx: PfcpContext<()> = PfcpContext::new(XactConfig {
            t3_response: Duration::from_millis(500),
            ..XactConfig::default()
        });
        ctx.nodes.add(peer, 0, false);
        ctx.nodes
            .start_timer(NodeTimer::NoHeartbeat(peer), Duration::from_secs(10), now);
        let id = ctx.xacts.local_create(peer, ()).unwrap();
        ctx.xacts
            .update_tx(id, &PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 0), &[])
            .unwrap();
        ctx.xacts.commit(id, &tx, now).unwrap();

        assert_eq!(ctx.next_deadline(), Some(now + Duration::from_millis(500)));
        assert_eq!(
            ctx.expire(now + Duration::from_millis(500)),
            vec![PfcpTimer::Xact(id)]
        );
    }
}
