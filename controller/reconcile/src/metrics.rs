use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use region_controller_core::deployment::ApplyOutcome;

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    applies: Family<ApplyLabels, Counter>,
    filter_failures: Family<FilterLabels, Counter>,
    cleanup_failures: Counter,
    clusters: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ApplyLabels {
    kind: &'static str,
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FilterLabels {
    filter: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "applies",
            "Count of cluster objects written by kind and outcome",
            metrics.applies.clone(),
        );
        prom.register(
            "filter_failures",
            "Count of ingress filter writes that failed and were skipped",
            metrics.filter_failures.clone(),
        );
        prom.register(
            "cleanup_failures",
            "Count of best-effort cleanup deletes that failed",
            metrics.cleanup_failures.clone(),
        );
        prom.register(
            "clusters",
            "Gauge of the number of cluster connections cached",
            metrics.clusters.clone(),
        );
        metrics
    }

    pub(crate) fn applied(&self, kind: &'static str, outcome: ApplyOutcome) {
        let outcome = match outcome {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::NotRequired => "not_required",
        };
        self.applies
            .get_or_create(&ApplyLabels { kind, outcome })
            .inc();
    }

    pub(crate) fn filter_failed(&self, filter: &'static str) {
        self.filter_failures
            .get_or_create(&FilterLabels { filter })
            .inc();
    }

    pub(crate) fn cleanup_failed(&self) {
        self.cleanup_failures.inc();
    }

    pub(crate) fn set_clusters(&self, n: usize) {
        self.clusters.set(n as i64);
    }
}
