//! UPF Timer Configuration
//!
//! Durations and retry limits for the node-level timers. Transaction
//! retransmission timers live in the PFCP transaction manager.

use std::time::Duration;

use ogs_pfcp::NodeTimer;

/// Node timer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpfTimerId {
    /// Association setup retry
    Association,
    /// Heartbeat interval while associated
    NoHeartbeat,
}

impl UpfTimerId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Association => "UPF_TIMER_ASSOCIATION",
            Self::NoHeartbeat => "UPF_TIMER_NO_HEARTBEAT",
        }
    }
}

impl From<NodeTimer> for UpfTimerId {
    fn from(timer: NodeTimer) -> Self {
        match timer {
            NodeTimer::Association(_) => Self::Association,
            NodeTimer::NoHeartbeat(_) => Self::NoHeartbeat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Retry limit, 0 means unbounded
    pub max_count: u32,
    pub duration: Duration,
}

impl TimerConfig {
    pub fn new_millis(max_count: u32, duration_millis: u64) -> Self {
        Self {
            max_count,
            duration: Duration::from_millis(duration_millis),
        }
    }
}

/// Per-kind node timer settings, built from `time.message.pfcp` and
/// `time.nf_instance`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpfTimerConfigs {
    pub association: TimerConfig,
    pub no_heartbeat: TimerConfig,
}

impl Default for UpfTimerConfigs {
    fn default() -> Self {
        Self {
            association: TimerConfig::new_millis(10, 3000),
            no_heartbeat: TimerConfig::new_millis(0, 10000),
        }
    }
}

impl UpfTimerConfigs {
    pub fn get(&self, timer_id: UpfTimerId) -> &TimerConfig {
        match timer_id {
            UpfTimerId::Association => &self.association,
            UpfTimerId::NoHeartbeat => &self.no_heartbeat,
        }
    }

    /// Interval to arm `timer` with
    pub fn duration(&self, timer: NodeTimer) -> Duration {
        self.get(timer.into()).duration
    }

    /// Association attempts before a self-initiated peer is marked
    /// unreachable
    pub fn association_max_retries(&self) -> u32 {
        self.association.max_count
    }
}
