//! Metrics registry
//!
//! A [`MetricsContext`] owns every registered metric family. Handles returned
//! by [`MetricsContext::create`] update their sample without taking the
//! registry lock, so the hot path is a single atomic operation.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::{MetricType, MetricsError, MetricsResult, MAX_LABELS};

struct Sample {
    label_values: Vec<String>,
    value: Arc<AtomicI64>,
}

struct Family {
    name: String,
    help: String,
    kind: MetricType,
    label_names: Vec<String>,
    samples: Vec<Sample>,
}

/// Handle to one labelled sample of a metric family
#[derive(Debug, Clone)]
pub struct Metric {
    kind: MetricType,
    value: Arc<AtomicI64>,
}

impl Metric {
    pub fn kind(&self) -> MetricType {
        self.kind
    }

    pub fn inc(&self) {
        self.add(1);
    }

    /// Counters ignore negative increments.
    pub fn add(&self, val: i64) {
        if self.kind == MetricType::Counter && val < 0 {
            log::warn!("Ignoring negative increment [{val}] on counter");
            return;
        }
        self.value.fetch_add(val, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        if self.kind == MetricType::Gauge {
            self.value.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Only gauges can be set.
    pub fn set(&self, val: i64) {
        if self.kind == MetricType::Gauge {
            self.value.store(val, Ordering::Relaxed);
        } else {
            log::warn!("Cannot set counter value");
        }
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Registry of metric families
#[derive(Default)]
pub struct MetricsContext {
    families: RwLock<Vec<Family>>,
}

impl MetricsContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or look up) the sample `name{labels}`.
    ///
    /// Creating the same name twice with the same type and label names
    /// returns a handle to the existing family; label values select the
    /// sample inside it.
    pub fn create(
        &self,
        kind: MetricType,
        name: &str,
        help: &str,
        labels: &[(&str, &str)],
    ) -> MetricsResult<Metric> {
        if labels.len() > MAX_LABELS {
            return Err(MetricsError::TooManyLabels {
                name: name.to_string(),
                count: labels.len(),
            });
        }

        let mut families = self
            .families
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let idx = match families.iter().position(|f| f.name == name) {
            Some(idx) => {
                let family = &families[idx];
                if family.kind != kind {
                    return Err(MetricsError::TypeMismatch(name.to_string()));
                }
                let same_labels = family.label_names.len() == labels.len()
                    && family
                        .label_names
                        .iter()
                        .zip(labels)
                        .all(|(have, (want, _))| have == want);
                if !same_labels {
                    return Err(MetricsError::LabelMismatch(name.to_string()));
                }
                idx
            }
            None => {
                families.push(Family {
                    name: name.to_string(),
                    help: help.to_string(),
                    kind,
                    label_names: labels.iter().map(|(n, _)| n.to_string()).collect(),
                    samples: Vec::new(),
                });
                families.len() - 1
            }
        };

        let family = &mut families[idx];
        let existing = family.samples.iter().find(|s| {
            s.label_values
                .iter()
                .zip(labels)
                .all(|(have, (_, want))| have == want)
        });
        let value = match existing {
            Some(sample) => sample.value.clone(),
            None => {
                let value = Arc::new(AtomicI64::new(0));
                family.samples.push(Sample {
                    label_values: labels.iter().map(|(_, v)| v.to_string()).collect(),
                    value: value.clone(),
                });
                value
            }
        };

        Ok(Metric { kind, value })
    }

    /// Number of registered families
    pub fn len(&self) -> usize {
        self.families
            .read()
            .map(|f| f.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every family. Outstanding handles keep working but are no
    /// longer rendered.
    pub fn clear(&self) {
        self.families
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> String {
        let families = self
            .families
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut out = String::new();
        for family in families.iter() {
            let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
            let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());
            for sample in &family.samples {
                out.push_str(&family.name);
                if !family.label_names.is_empty() {
                    out.push('{');
                    for (i, (name, value)) in family
                        .label_names
                        .iter()
                        .zip(&sample.label_values)
                        .enumerate()
                    {
                        if i > 0 {
                            out.push(',');
                        }
                        let _ = write!(out, "{name}=\"{}\"", escape_label(value));
                    }
                    out.push('}');
                }
                let _ = writeln!(out, " {}", sample.value.load(Ordering::Relaxed));
            }
        }
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_ops() {
        let ctx = MetricsContext::new();
        let m = ctx
            .create(MetricType::Counter, "upf_test_total", "Test", &[])
            .unwrap();
        m.inc();
        m.add(4);
        m.add(-3);
        m.set(100);
        assert_eq!(m.value(), 5);
    }

    #[test]
    fn test_gauge_ops() {
        let ctx = MetricsContext::new();
        let m = ctx
            .create(MetricType::Gauge, "upf_sessionnbr", "Sessions", &[])
            .unwrap();
        m.set(10);
        m.dec();
        m.add(-2);
        assert_eq!(m.value(), 7);
    }

    #[test]
    fn test_create_twice_shares_sample() {
        let ctx = MetricsContext::new();
        let a = ctx.create(MetricType::Counter, "c", "h", &[("cause", "1")]).unwrap();
        let b = ctx.create(MetricType::Counter, "c", "h", &[("cause", "1")]).unwrap();
        let other = ctx.create(MetricType::Counter, "c", "h", &[("cause", "64")]).unwrap();
        a.inc();
        b.inc();
        other.inc();
        assert_eq!(a.value(), 2);
        assert_eq!(other.value(), 1);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_create_mismatch() {
        let ctx = MetricsContext::new();
        ctx.create(MetricType::Counter, "c", "h", &[("a", "1")]).unwrap();
        assert!(matches!(
            ctx.create(MetricType::Gauge, "c", "h", &[("a", "1")]),
            Err(MetricsError::TypeMismatch(_))
        ));
        assert!(matches!(
            ctx.create(MetricType::Counter, "c", "h", &[("b", "1")]),
            Err(MetricsError::LabelMismatch(_))
        ));
        let many: Vec<(&str, &str)> = (0..=MAX_LABELS).map(|_| ("x", "y")).collect();
        assert!(matches!(
            ctx.create(MetricType::Counter, "d", "h", &many),
            Err(MetricsError::TooManyLabels { .. })
        ));
    }

    #[test]
    fn test_render() {
        let ctx = MetricsContext::new();
        ctx.create(MetricType::Gauge, "upf_sessionnbr", "Active Sessions", &[])
            .unwrap()
            .set(3);
        ctx.create(MetricType::Counter, "upf_req", "Requests", &[("cause", "a\"b")])
            .unwrap()
            .inc();

        let text = ctx.render();
        assert!(text.contains("# HELP upf_sessionnbr Active Sessions\n"));
        assert!(text.contains("# TYPE upf_sessionnbr gauge\n"));
        assert!(text.contains("upf_sessionnbr 3\n"));
        assert!(text.contains("# TYPE upf_req counter\n"));
        assert!(text.contains("upf_req{cause=\"a\\\"b\"} 1\n"));
    }

    #[test]
    fn test_clear() {
        let ctx = MetricsContext::new();
        let m = ctx.create(MetricType::Counter, "c", "h", &[]).unwrap();
        ctx.clear();
        m.inc();
        assert!(ctx.is_empty());
        assert_eq!(ctx.render(), "");
    }
}
