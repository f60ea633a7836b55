use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

/// Counts reconcile passes and how long they take.
#[derive(Clone, Debug)]
pub struct ReconcileMetrics {
    passes: Family<ResultLabels, Counter>,
    duration: Histogram,
    writes_skipped: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ResultLabels {
    result: &'static str,
}

/// How a pass ended, as recorded in the `result` label.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PassResult {
    Ready,
    NotReady,
    Undeployed,
    Unmanaged,
    Standby,
    Error,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let passes = Family::<ResultLabels, Counter>::default();
        reg.register(
            "passes",
            "Total number of forwarder reconcile passes by result",
            passes.clone(),
        );

        // Passes that wait on the trust bundle take up to its timeout.
        let duration = Histogram::new([0.01, 0.1, 1.0, 5.0, 30.0, 60.0]);
        reg.register_with_unit(
            "duration",
            "Histogram of forwarder reconcile pass durations",
            Unit::Seconds,
            duration.clone(),
        );

        let writes_skipped = Counter::default();
        reg.register(
            "status_unchanged",
            "Total number of passes whose status already matched the stored status",
            writes_skipped.clone(),
        );

        Self {
            passes,
            duration,
            writes_skipped,
        }
    }

    pub(crate) fn observe(&self, start: time::Instant, result: PassResult) {
        self.duration.observe(start.elapsed().as_secs_f64());
        self.passes
            .get_or_create(&ResultLabels {
                result: result.as_str(),
            })
            .inc();
    }

    pub(crate) fn status_unchanged(&self) {
        self.writes_skipped.inc();
    }
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

// === impl PassResult ===

impl PassResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NotReady => "not_ready",
            Self::Undeployed => "undeployed",
            Self::Unmanaged => "unmanaged",
            Self::Standby => "standby",
            Self::Error => "error",
        }
    }
}
