//! UPF Metrics
//!
//! Global UPF counters registered in the metrics context at startup.

use std::sync::Arc;

use ogs_metrics::{Metric, MetricType, MetricsContext, MetricsResult};

pub const UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ: &str = "upf_sm_n4sessionestabreq";
pub const UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT: &str = "upf_sm_n4sessionreport";
pub const UPF_METR_GLOB_CTR_SM_N4SESSIONREPORTSUCC: &str = "upf_sm_n4sessionreportsucc";
pub const UPF_METR_GLOB_GAUGE_SESSIONNBR: &str = "upf_sessionnbr";

/// Something that can bump a named counter
pub trait CounterSink {
    fn increment_counter(&self, name: &str);
}

pub struct UpfMetrics {
    ctx: Arc<MetricsContext>,
    n4_session_estab_req: Metric,
    n4_session_report: Metric,
    n4_session_report_succ: Metric,
    sessions: Metric,
}

impl UpfMetrics {
    pub fn new(ctx: Arc<MetricsContext>) -> MetricsResult<Self> {
        let counter = |name, help| ctx.create(MetricType::Counter, name, help, &[]);
        Ok(Self {
            n4_session_estab_req: counter(
                UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ,
                "Number of requested N4 session establishments",
            )?,
            n4_session_report: counter(
                UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT,
                "Number of requested N4 session reports",
            )?,
            n4_session_report_succ: counter(
                UPF_METR_GLOB_CTR_SM_N4SESSIONREPORTSUCC,
                "Number of successful N4 session reports",
            )?,
            sessions: ctx.create(
                MetricType::Gauge,
                UPF_METR_GLOB_GAUGE_SESSIONNBR,
                "Active Sessions",
                &[],
            )?,
            ctx,
        })
    }

    pub fn context(&self) -> &Arc<MetricsContext> {
        &self.ctx
    }

    pub fn set_sessions(&self, count: usize) {
        self.sessions.set(count as i64);
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.lookup(name).map(Metric::value)
    }

    fn lookup(&self, name: &str) -> Option<&Metric> {
        match name {
            UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ => Some(&self.n4_session_estab_req),
            UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT => Some(&self.n4_session_report),
            UPF_METR_GLOB_CTR_SM_N4SESSIONREPORTSUCC => Some(&self.n4_session_report_succ),
            UPF_METR_GLOB_GAUGE_SESSIONNBR => Some(&self.sessions),
            _ => None,
        }
    }
}

impl CounterSink for UpfMetrics {
    fn increment_counter(&self, name: &str) {
        match self.lookup(name) {
            Some(metric) if metric.kind() == MetricType::Counter => metric.inc(),
            _ => log::warn!("Unknown counter [{name}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = UpfMetrics::new(MetricsContext::new()).unwrap();
        metrics.increment_counter(UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT);
        metrics.increment_counter(UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT);
        metrics.increment_counter("upf_unknown");
        metrics.increment_counter(UPF_METR_GLOB_GAUGE_SESSIONNBR);
        assert_eq!(metrics.value(UPF_METR_GLOB_CTR_SM_N4SESSIONREPORT), Some(2));
        assert_eq!(metrics.value(UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ), Some(0));
        assert_eq!(metrics.value(UPF_METR_GLOB_GAUGE_SESSIONNBR), Some(0));
        assert_eq!(metrics.value("upf_unknown"), None);
    }

    #[test]
    fn test_rendered() {
        let metrics = UpfMetrics::new(MetricsContext::new()).unwrap();
        metrics.set_sessions(3);
        let text = metrics.context().render();
        assert!(text.contains("# TYPE upf_sm_n4sessionreport counter\n"));
        assert!(text.contains("upf_sessionnbr 3\n"));
    }
}
