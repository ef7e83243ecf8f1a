//! UPF Context
//!
//! Everything the control plane owns: configuration, the PFCP node
//! registry and transaction manager, and the session table. The context is
//! built once in `main` and handed to every handler by `&mut`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use ogs_pfcp::types::{FSeid, NodeId};
use ogs_pfcp::{PfcpContext, PfcpError, PfcpResult};

use crate::config::UpfConfig;
use crate::metrics::UpfMetrics;
use crate::timer::UpfTimerConfigs;

/// Seconds between the NTP epoch (1900) and the Unix epoch
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Stable session handle. Never reused, so a late lookup of a deleted
/// session misses instead of hitting a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessId(u64);

impl fmt::Display for SessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application data attached to a PFCP transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XactData {
    /// Peer-initiated request
    #[default]
    None,
    /// Session Report Request for this session
    SessionReport(SessId),
    Heartbeat,
    AssociationSetup,
}

#[derive(Debug, Clone)]
pub struct UpfSess {
    pub id: SessId,
    /// SMF node the session belongs to
    pub node: SocketAddr,
    pub upf_n4_seid: u64,
    pub smf_n4_f_seid: FSeid,
    /// Installed packet detection rules
    pub pdr_ids: BTreeSet<u16>,
}

pub struct UpfContext {
    pub config: UpfConfig,
    pub pfcp: PfcpContext<XactData>,
    pub timers: UpfTimerConfigs,
    pub metrics: UpfMetrics,
    /// Advertised PFCP address, used for the Node ID and the UP F-SEID
    pub pfcp_addr: IpAddr,
    pub node_id: NodeId,
    pub recovery_time_stamp: u32,

    sess_list: HashMap<SessId, UpfSess>,
    upf_n4_seid_hash: HashMap<u64, SessId>,
    smf_n4_seid_hash: HashMap<(SocketAddr, u64), SessId>,
    max_num_of_sess: usize,
    next_sess_id: u64,
    n4_seid_generator: u64,
}

impl UpfContext {
    pub fn new(config: UpfConfig, metrics: UpfMetrics, pfcp_addr: IpAddr) -> Self {
        let pfcp = PfcpContext::new(config.xact_config());
        let timers = config.timer_configs();
        let max_num_of_sess = config.max.sessions;
        let recovery_time_stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_secs() + NTP_UNIX_OFFSET) as u32)
            .unwrap_or(0);

        log::info!("UPF context initialized with max {} sessions", max_num_of_sess);
        metrics.set_sessions(0);

        Self {
            config,
            pfcp,
            timers,
            metrics,
            pfcp_addr,
            node_id: NodeId::from(pfcp_addr),
            recovery_time_stamp,
            sess_list: HashMap::new(),
            upf_n4_seid_hash: HashMap::new(),
            smf_n4_seid_hash: HashMap::new(),
            max_num_of_sess,
            next_sess_id: 1,
            n4_seid_generator: 1,
        }
    }

    fn next_n4_seid(&mut self) -> u64 {
        loop {
            let seid = self.n4_seid_generator;
            self.n4_seid_generator = self.n4_seid_generator.wrapping_add(1).max(1);
            if !self.upf_n4_seid_hash.contains_key(&seid) {
                return seid;
            }
        }
    }

    /// Create a session for the SMF F-SEID received from `node`
    pub fn sess_add(&mut self, node: SocketAddr, f_seid: &FSeid) -> PfcpResult<&mut UpfSess> {
        if self.sess_list.len() >= self.max_num_of_sess {
            log::error!("Maximum number of sessions [{}] reached", self.max_num_of_sess);
            return Err(PfcpError::ResourceExhausted("session"));
        }

        let id = SessId(self.next_sess_id);
        self.next_sess_id += 1;
        let upf_n4_seid = self.next_n4_seid();

        self.upf_n4_seid_hash.insert(upf_n4_seid, id);
        self.smf_n4_seid_hash.insert((node, f_seid.seid), id);
        self.metrics.set_sessions(self.sess_list.len() + 1);

        log::info!(
            "[Added] Number of UPF-Sessions is now {} (id={}, upf_seid={:#x}, smf_seid={:#x})",
            self.sess_list.len() + 1,
            id,
            upf_n4_seid,
            f_seid.seid
        );

        Ok(self.sess_list.entry(id).or_insert(UpfSess {
            id,
            node,
            upf_n4_seid,
            smf_n4_f_seid: f_seid.clone(),
            pdr_ids: BTreeSet::new(),
        }))
    }

    pub fn sess_remove(&mut self, id: SessId) -> Option<UpfSess> {
        let sess = self.sess_list.remove(&id)?;
        self.upf_n4_seid_hash.remove(&sess.upf_n4_seid);
        self.smf_n4_seid_hash.remove(&(sess.node, sess.smf_n4_f_seid.seid));
        self.metrics.set_sessions(self.sess_list.len());
        log::info!(
            "[Removed] Number of UPF-sessions is now {} (id={})",
            self.sess_list.len(),
            id
        );
        Some(sess)
    }

    /// Drop every session owned by `node`
    pub fn sess_remove_all_for_node(&mut self, node: &SocketAddr) -> usize {
        let ids: Vec<SessId> = self
            .sess_list
            .values()
            .filter(|s| s.node == *node)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            self.sess_remove(*id);
        }
        ids.len()
    }

    pub fn sess_remove_all(&mut self) {
        let ids: Vec<SessId> = self.sess_list.keys().copied().collect();
        for id in ids {
            self.sess_remove(id);
        }
    }

    pub fn sess_find_by_id(&self, id: SessId) -> Option<&UpfSess> {
        self.sess_list.get(&id)
    }

    pub fn sess_find_by_id_mut(&mut self, id: SessId) -> Option<&mut UpfSess> {
        self.sess_list.get_mut(&id)
    }

    /// Lookup by the SEID the UPF allocated
    pub fn sess_find_by_upf_n4_seid(&self, seid: u64) -> Option<&UpfSess> {
        self.upf_n4_seid_hash
            .get(&seid)
            .and_then(|id| self.sess_list.get(id))
    }

    /// Lookup by the SEID the SMF allocated on `node`
    pub fn sess_find_by_smf_n4_seid(&self, node: SocketAddr, seid: u64) -> Option<&UpfSess> {
        self.smf_n4_seid_hash
            .get(&(node, seid))
            .and_then(|id| self.sess_list.get(id))
    }

    pub fn sess_count(&self) -> usize {
        self.sess_list.len()
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use crate::metrics::UPF_METR_GLOB_GAUGE_SESSIONNBR;

    #[test]
    fn test_sess_add_and_find() {
        let mut ctx = context();
        let (id, seid) = {
            let sess = ctx.sess_add(smf(), &smf_f_seid(0x10)).unwrap();
            (sess.id, sess.upf_n4_seid)
        };

        assert_eq!(ctx.sess_count(), 1);
        assert_eq!(ctx.sess_find_by_id(id).unwrap().upf_n4_seid, seid);
        assert_eq!(ctx.sess_find_by_upf_n4_seid(seid).unwrap().id, id);
        assert_eq!(ctx.sess_find_by_smf_n4_seid(smf(), 0x10).unwrap().id, id);
        assert!(ctx
            .sess_find_by_smf_n4_seid("127.0.0.5:8805".parse().unwrap(), 0x10)
            .is_none());
        assert_eq!(ctx.metrics.value(UPF_METR_GLOB_GAUGE_SESSIONNBR), Some(1));
    }

    #[test]
    fn test_sess_seids_unique() {
        let mut ctx = context();
        let mut seids = BTreeSet::new();
        for i in 0..10 {
            let seid = ctx.sess_add(smf(), &smf_f_seid(i)).unwrap().upf_n4_seid;
            assert!(seids.insert(seid));
        }
    }

    #[test]
    fn test_sess_table_full() {
        let mut config = UpfConfig::default();
        config.max.sessions = 2;
        let mut ctx = context_with(config);
        ctx.sess_add(smf(), &smf_f_seid(1)).unwrap();
        ctx.sess_add(smf(), &smf_f_seid(2)).unwrap();
        assert!(matches!(
            ctx.sess_add(smf(), &smf_f_seid(3)),
            Err(PfcpError::ResourceExhausted(_))
        ));
        assert_eq!(ctx.sess_count(), 2);
    }

    #[test]
    fn test_sess_remove() {
        let mut ctx = context();
        let id = ctx.sess_add(smf(), &smf_f_seid(1)).unwrap().id;
        let seid = ctx.sess_find_by_id(id).unwrap().upf_n4_seid;

        assert!(ctx.sess_remove(id).is_some());
        assert!(ctx.sess_remove(id).is_none());
        assert!(ctx.sess_find_by_id(id).is_none());
        assert!(ctx.sess_find_by_upf_n4_seid(seid).is_none());
        assert!(ctx.sess_find_by_smf_n4_seid(smf(), 1).is_none());
        assert_eq!(ctx.metrics.value(UPF_METR_GLOB_GAUGE_SESSIONNBR), Some(0));

        let next = ctx.sess_add(smf(), &smf_f_seid(1)).unwrap().id;
        assert_ne!(next, id);
    }

    #[test]
    fn test_sess_remove_all_for_node() {
        let mut ctx = context();
        let other: SocketAddr = "127.0.0.5:8805".parse().unwrap();
        ctx.sess_add(smf(), &smf_f_seid(1)).unwrap();
        ctx.sess_add(smf(), &smf_f_seid(2)).unwrap();
        ctx.sess_add(other, &smf_f_seid(1)).unwrap();

        assert_eq!(ctx.sess_remove_all_for_node(&smf()), 2);
        assert_eq!(ctx.sess_count(), 1);
        assert!(ctx.sess_find_by_smf_n4_seid(other, 1).is_some());

        ctx.sess_remove_all();
        assert_eq!(ctx.sess_count(), 0);
    }
}
