//! The reconciliation loop.
//!
//! Each tick is a single-threaded pass: reclaim stale reservation taints,
//! discover starving critical workloads, place each one (taint, evict,
//! wait), then reclaim taints again. Waiters run as detached tasks
//! concurrently with the loop; the In-Flight Set is the only shared state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::classify;
use crate::cluster::ClusterApi;
use crate::config::Config;
use crate::inflight::InFlightSet;
use crate::metrics::Metrics;
use crate::model::{Node, Workload};
use crate::oracle::FeasibilityOracle;
use crate::reservation;

/// Event reason recorded on a critical workload no node can host.
pub const DOES_NOT_FIT_EVENT: &str = "PodDoestFitAnyNode";

/// How often a waiter polls for the workload's node binding.
const WAITER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The rescheduler control loop.
pub struct Rescheduler {
    api: Arc<dyn ClusterApi>,
    oracle: Arc<dyn FeasibilityOracle>,
    metrics: Arc<Metrics>,
    in_flight: Arc<InFlightSet>,
    system_namespace: String,
    housekeeping_interval: Duration,
    pod_scheduled_timeout: Duration,
    grace_period_seconds: i64,
}

impl Rescheduler {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        oracle: Arc<dyn FeasibilityOracle>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            oracle,
            metrics,
            in_flight: Arc::new(InFlightSet::new()),
            system_namespace: config.system_namespace.clone(),
            housekeeping_interval: config.housekeeping_interval(),
            pod_scheduled_timeout: config.pod_scheduled_timeout(),
            grace_period_seconds: config.grace_period,
        }
    }

    /// The shared In-Flight Set, exposed for integration tests.
    pub fn in_flight(&self) -> Arc<InFlightSet> {
        Arc::clone(&self.in_flight)
    }

    /// Run the loop forever. There is no shutdown path; process
    /// termination is abrupt.
    pub async fn run(&self) {
        info!(
            interval_secs = self.housekeeping_interval.as_secs(),
            namespace = %self.system_namespace,
            "Starting rescheduler loop"
        );

        self.run_startup_migration().await;

        let mut interval = tokio::time::interval(self.housekeeping_interval);
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One-shot startup pass: reclaim legacy-annotation taints left by a
    /// prior-format rescheduler, then reclaim structured taints left by a
    /// prior process generation.
    pub async fn run_startup_migration(&self) {
        let nodes = match self.api.list_ready_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Cannot run startup migration - error while listing nodes");
                return;
            }
        };

        reservation::release_legacy_annotation_taints(self.api.as_ref(), &nodes).await;
        reservation::release_reservation_taints(self.api.as_ref(), &nodes, &self.in_flight).await;
    }

    /// A single reconciliation pass. Partial failure never aborts the
    /// tick; errors are logged and the affected item is skipped.
    pub async fn tick(&self) {
        self.release_stale_taints().await;

        let unscheduled = match self
            .api
            .list_unscheduled_workloads(&self.system_namespace)
            .await
        {
            Ok(workloads) => workloads,
            Err(e) => {
                error!(error = %e, "Failed to list unscheduled workloads");
                return;
            }
        };

        let starving: Vec<Workload> = unscheduled
            .into_iter()
            .filter(|w| {
                classify::is_critical(w, &self.system_namespace)
                    && classify::is_daemon_managed(w)
                    && !self.in_flight.contains(w)
            })
            .collect();
        debug!(count = starving.len(), "Critical workloads awaiting placement");

        for workload in &starving {
            self.place_workload(workload).await;
        }

        self.release_stale_taints().await;
    }

    /// Taint GC over the current ready-node set.
    async fn release_stale_taints(&self) {
        let nodes = match self.api.list_ready_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Cannot release taints - error while listing nodes");
                return;
            }
        };
        reservation::release_reservation_taints(self.api.as_ref(), &nodes, &self.in_flight).await;
    }

    /// Attempt placement for one critical workload: find a node, run the
    /// reservation protocol, then hand off to a waiter.
    async fn place_workload(&self, workload: &Workload) {
        let workload_id = workload.id();
        info!(
            workload = %workload_id,
            "Critical workload is unschedulable, trying to find a spot for it"
        );
        self.metrics
            .observe_unschedulable_critical(workload.app_name());

        let nodes = match self.api.list_ready_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "Failed to list nodes");
                return;
            }
        };

        let Some(node) = self.find_node_for_workload(&nodes, workload).await else {
            error!(workload = %workload_id, "Workload can't be scheduled on any existing node");
            let message =
                format!("Critical workload {workload_id} doesn't fit on any node.");
            if let Err(e) = self
                .api
                .emit_event(workload, DOES_NOT_FIT_EVENT, &message)
                .await
            {
                warn!(workload = %workload_id, error = %e, "Error while emitting event");
            }
            return;
        };

        info!(workload = %workload_id, node = %node.name, "Trying to place the workload");

        match reservation::reserve_node(
            self.api.as_ref(),
            self.oracle.as_ref(),
            &self.metrics,
            node,
            workload,
            self.grace_period_seconds,
            &self.system_namespace,
        )
        .await
        {
            Ok(()) => {
                self.in_flight.add(workload);
                tokio::spawn(wait_for_scheduled(
                    Arc::clone(&self.api),
                    Arc::clone(&self.in_flight),
                    workload.clone(),
                    self.pod_scheduled_timeout,
                ));
            }
            Err(e) => warn!(workload = %workload_id, error = %e, "Reservation failed"),
        }
    }

    /// First-fit candidate selection over the ready-node list.
    ///
    /// Nodes already carrying a reservation taint are skipped; so are nodes
    /// whose resident listing fails. Selection only simulates - the
    /// reservation protocol re-simulates after the taint lands.
    async fn find_node_for_workload<'n>(
        &self,
        nodes: &'n [Node],
        workload: &Workload,
    ) -> Option<&'n Node> {
        for node in nodes {
            if node.has_reservation_taint() {
                warn!(node = %node.name, "Skipping node with reservation taint");
                continue;
            }

            let residents = match self.api.list_workloads_on_node(&node.name).await {
                Ok(residents) => residents,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Skipping node due to error");
                    continue;
                }
            };

            match crate::simulator::plan_admission(
                node,
                &residents,
                workload,
                self.oracle.as_ref(),
                &self.system_namespace,
            ) {
                Ok(_) => return Some(node),
                Err(reason) => {
                    debug!(node = %node.name, workload = %workload.id(), reason = %reason, "Node rejected");
                }
            }
        }
        None
    }
}

/// Poll the workload until it acquires a node binding or the timeout
/// expires, then drop it from the In-Flight Set either way.
pub async fn wait_for_scheduled(
    api: Arc<dyn ClusterApi>,
    in_flight: Arc<InFlightSet>,
    workload: Workload,
    timeout: Duration,
) {
    let workload_id = workload.id();
    info!(workload = %workload_id, "Waiting for workload to be scheduled");

    let poll = async {
        loop {
            tokio::time::sleep(WAITER_POLL_INTERVAL).await;
            match api.get_workload(&workload.namespace, &workload.name).await {
                Ok(current) if current.node_name.is_some() => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(workload = %workload_id, error = %e, "Error while getting workload");
                }
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(()) => info!(workload = %workload_id, "Workload was successfully scheduled"),
        Err(_) => warn!(
            workload = %workload_id,
            timeout_secs = timeout.as_secs(),
            "Timeout while waiting for workload to be scheduled"
        ),
    }

    in_flight.remove(&workload);
}
