//! Prometheus metrics for the dispatch runtime.
//!
//! Recording is always on and cheap; nothing is exported until
//! [`MetricsRecorder::install`] installs the Prometheus recorder. Serving the
//! rendered text is left to the application.
//!
//! # Example
//!
//! ```rust,no_run
//! use api_dispatch_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! println!("{}", recorder.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Histogram buckets for `*_duration_seconds`, up to the default 30s timeout.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Errors from installing the metrics recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The bucket configuration was rejected
    #[error("invalid metrics configuration: {0}")]
    Build(String),
    /// Another global recorder is already installed
    #[error("a global metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Install the Prometheus recorder as the global `metrics` recorder and
    /// describe the dispatch metrics.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::AlreadyInstalled` when a global recorder exists,
    /// or `MetricsError::Build` if the bucket configuration is invalid.
    pub fn install() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), DURATION_BUCKETS)
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();

        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;
        register_metrics();
        tracing::info!("Dispatch metrics recorder installed");

        Ok(Self { handle })
    }

    /// Prometheus handle, for wiring into an HTTP endpoint.
    #[must_use]
    pub const fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn register_metrics() {
    describe_counter!(
        "dispatch_requests_total",
        "Total number of classified outcomes, labelled by outcome"
    );
    describe_counter!(
        "dispatch_intercepted_total",
        "Total number of requests suppressed by their interception predicate"
    );
    describe_counter!(
        "dispatch_cancelled_total",
        "Total number of in-flight requests cancelled"
    );
    describe_histogram!(
        "dispatch_request_duration_seconds",
        "Time from issuing a request to its transport completion"
    );
    describe_gauge!(
        "dispatch_in_flight",
        "Number of requests currently in flight"
    );
}

/// Outcome label of a classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// `status == true`
    Success,
    /// `status == false`
    Failed,
    /// Transport failure
    SystemError,
}

impl OutcomeKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::SystemError => "system_error",
        }
    }
}

/// Dispatch metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a classified outcome.
    pub fn record_outcome(kind: OutcomeKind) {
        counter!("dispatch_requests_total", "outcome" => kind.label()).increment(1);
    }

    /// Record an intercepted request.
    pub fn record_intercepted() {
        counter!("dispatch_intercepted_total").increment(1);
    }

    /// Record a cancelled request.
    pub fn record_cancelled() {
        counter!("dispatch_cancelled_total").increment(1);
    }

    /// Record the duration of a transport exchange.
    pub fn record_exchange(duration: Duration) {
        histogram!("dispatch_request_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record the current number of in-flight requests.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_in_flight(count: usize) {
        gauge!("dispatch_in_flight").set(count as f64);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(OutcomeKind::Success.label(), "success");
        assert_eq!(OutcomeKind::Failed.label(), "failed");
        assert_eq!(OutcomeKind::SystemError.label(), "system_error");
    }

    // The only test in this binary that touches the global recorder.
    #[test]
    fn installs_once_and_renders_dispatch_metrics() {
        let recorder = MetricsRecorder::install().expect("first install");
        assert!(matches!(MetricsRecorder::install(), Err(MetricsError::AlreadyInstalled)));

        DispatchMetrics::record_outcome(OutcomeKind::Success);
        DispatchMetrics::record_intercepted();
        DispatchMetrics::record_exchange(Duration::from_millis(20));

        let rendered = recorder.render();
        assert!(rendered.contains("dispatch_requests_total{outcome=\"success\"}"), "{rendered}");
        assert!(rendered.contains("dispatch_intercepted_total"));
        assert!(rendered.contains("dispatch_request_duration_seconds_bucket"));
    }
}
