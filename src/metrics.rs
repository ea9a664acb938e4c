//! Counters and the scrape endpoint.
//!
//! Two counters: unschedulable critical workloads observed (labeled by the
//! application name from the well-known label) and workloads deleted by the
//! rescheduler. Rendered in Prometheus text exposition format on scrape.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tracing::info;

/// Rescheduler counters.
#[derive(Debug, Default)]
pub struct Metrics {
    unschedulable_critical: Mutex<BTreeMap<String, u64>>,
    deleted_workloads: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation of an unschedulable critical workload.
    pub fn observe_unschedulable_critical(&self, app: &str) {
        let mut by_app = self.unschedulable_critical.lock().expect("metrics lock");
        *by_app.entry(app.to_string()).or_insert(0) += 1;
    }

    /// Count one workload deleted by the rescheduler.
    pub fn inc_deleted_workloads(&self) {
        self.deleted_workloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deleted_workloads(&self) -> u64 {
        self.deleted_workloads.load(Ordering::Relaxed)
    }

    /// Render the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(
            "# HELP rescheduler_unschedulable_critical_workloads_total \
             Number of times critical workloads were observed unschedulable.\n",
        );
        out.push_str("# TYPE rescheduler_unschedulable_critical_workloads_total counter\n");
        for (app, count) in self.unschedulable_critical.lock().expect("metrics lock").iter() {
            out.push_str(&format!(
                "rescheduler_unschedulable_critical_workloads_total{{app=\"{app}\"}} {count}\n"
            ));
        }

        out.push_str(
            "# HELP rescheduler_deleted_workloads_total \
             Number of workloads deleted by the rescheduler.\n",
        );
        out.push_str("# TYPE rescheduler_deleted_workloads_total counter\n");
        out.push_str(&format!(
            "rescheduler_deleted_workloads_total {}\n",
            self.deleted_workloads()
        ));

        out
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.render()
}

/// Create the metrics routes.
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Bind and serve the metrics endpoint until the process exits.
pub async fn serve(listen_address: SocketAddr, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    info!(addr = %listen_address, "Serving metrics");
    axum::serve(listener, router(metrics)).await
}
