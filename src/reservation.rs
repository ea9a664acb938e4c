//! Reservation protocol: taint placement, eviction, and taint reclamation.
//!
//! A reservation is a `CriticalAddonsOnly` taint whose value names the
//! owning critical workload. The taint is persisted before any eviction and
//! is deliberately left in place on success; taint GC removes it once the
//! owner leaves the In-Flight Set. Observable order per reservation:
//! taint persisted, evictions initiated, In-Flight membership, waiter start
//! (the last two belong to the caller).

use thiserror::Error;
use tracing::{info, warn};

use crate::cluster::{ClusterApi, ClusterError};
use crate::inflight::InFlightSet;
use crate::metrics::Metrics;
use crate::model::{Node, Taint, Workload, LEGACY_TAINTS_ANNOTATION_KEY};
use crate::oracle::{FeasibilityOracle, UnfitReason};
use crate::simulator;

/// Event reason recorded on each evicted workload.
pub const DELETED_BY_RESCHEDULER_EVENT: &str = "DeletedByRescheduler";

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("error while adding taint to node {node}: {source}")]
    Taint {
        node: String,
        #[source]
        source: ClusterError,
    },

    #[error("error while listing workloads on node {node}: {source}")]
    ListResidents {
        node: String,
        #[source]
        source: ClusterError,
    },

    #[error("workload {workload} doesn't fit on node {node}: {reason}")]
    DoesNotFit {
        workload: String,
        node: String,
        reason: UnfitReason,
    },

    #[error("failed to delete workload {workload}: {source}")]
    Evict {
        workload: String,
        #[source]
        source: ClusterError,
    },
}

/// Append a reservation taint for `workload_id` to a clone of `node` and
/// persist it.
pub async fn add_reservation_taint(
    api: &dyn ClusterApi,
    node: &Node,
    workload_id: &str,
) -> Result<(), ClusterError> {
    let mut tainted = node.clone();
    tainted.taints.push(Taint::reservation(workload_id));
    api.update_node(&tainted).await
}

/// Taint GC: remove every reservation taint whose owner is not in-flight.
///
/// Failures are logged per node and never abort the pass. Running the pass
/// twice with no intervening state change updates nothing the second time.
pub async fn release_reservation_taints(
    api: &dyn ClusterApi,
    nodes: &[Node],
    in_flight: &InFlightSet,
) {
    for node in nodes {
        let kept: Vec<Taint> = node
            .taints
            .iter()
            .filter(|taint| {
                if taint.is_reservation() && !in_flight.contains_id(&taint.value) {
                    info!(node = %node.name, owner = %taint.value, "Releasing reservation taint");
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        if kept.len() == node.taints.len() {
            continue;
        }

        let mut updated = node.clone();
        updated.taints = kept;
        match api.update_node(&updated).await {
            Ok(()) => info!(node = %node.name, "Released reservation taints"),
            Err(e) => warn!(node = %node.name, error = %e, "Error while releasing taints"),
        }
    }
}

/// Drop reservation taints from a legacy annotation value.
///
/// Returns the re-serialized remainder if anything was dropped, `None` if
/// the list is unchanged.
pub fn strip_legacy_reservation_taints(raw: &str) -> Result<Option<String>, serde_json::Error> {
    let taints: Vec<Taint> = serde_json::from_str(raw)?;
    let kept: Vec<&Taint> = taints.iter().filter(|t| !t.is_reservation()).collect();

    if kept.len() == taints.len() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&kept)?))
}

/// Startup migration: strip reservation taints left in the legacy
/// annotation location by a prior-format rescheduler, unconditionally of
/// In-Flight membership. Other taints in the annotation are preserved.
pub async fn release_legacy_annotation_taints(api: &dyn ClusterApi, nodes: &[Node]) {
    info!("Removing reservation taints from legacy node annotations");

    for node in nodes {
        let Some(raw) = node.annotations.get(LEGACY_TAINTS_ANNOTATION_KEY) else {
            continue;
        };

        let stripped = match strip_legacy_reservation_taints(raw) {
            Ok(stripped) => stripped,
            Err(e) => {
                warn!(node = %node.name, error = %e, "Error while parsing legacy taints annotation");
                continue;
            }
        };

        if let Some(remainder) = stripped {
            let mut updated = node.clone();
            updated
                .annotations
                .insert(LEGACY_TAINTS_ANNOTATION_KEY.to_string(), remainder);
            match api.update_node(&updated).await {
                Ok(()) => info!(node = %node.name, "Released legacy annotation taints"),
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Error while releasing legacy taints")
                }
            }
        }
    }
}

/// The grace-period override for an evictee: the configured grace when it is
/// non-negative and tighter than the workload's own, otherwise none.
pub fn effective_grace(configured_seconds: i64, workload: &Workload) -> Option<i64> {
    if configured_seconds < 0 {
        return None;
    }
    match workload.termination_grace_period_seconds {
        Some(own) if own <= configured_seconds => None,
        _ => Some(configured_seconds),
    }
}

/// Transition `node` from its current resident set to "reserved for
/// `critical`", evicting whatever the simulator says must go.
///
/// On failure after the taint is persisted, the taint is intentionally left
/// behind; taint GC reclaims it on the next tick because the workload never
/// enters the In-Flight Set.
pub async fn reserve_node(
    api: &dyn ClusterApi,
    oracle: &dyn FeasibilityOracle,
    metrics: &Metrics,
    node: &Node,
    critical: &Workload,
    grace_period_seconds: i64,
    system_namespace: &str,
) -> Result<(), ReservationError> {
    let critical_id = critical.id();

    add_reservation_taint(api, node, &critical_id)
        .await
        .map_err(|source| ReservationError::Taint {
            node: node.name.clone(),
            source,
        })?;

    // Fresh resident snapshot: another workload may have landed between
    // candidate selection and the taint landing.
    let residents = api
        .list_workloads_on_node(&node.name)
        .await
        .map_err(|source| ReservationError::ListResidents {
            node: node.name.clone(),
            source,
        })?;

    let evictees = simulator::plan_admission(node, &residents, critical, oracle, system_namespace)
        .map_err(|reason| ReservationError::DoesNotFit {
            workload: critical_id.clone(),
            node: node.name.clone(),
            reason,
        })?;

    for evictee in &evictees {
        let evictee_id = evictee.id();
        info!(
            workload = %evictee_id,
            critical = %critical_id,
            node = %node.name,
            "Deleting workload to make room for critical workload"
        );

        let message = format!(
            "Deleted by rescheduler in order to schedule critical workload {critical_id}."
        );
        if let Err(e) = api
            .emit_event(evictee, DELETED_BY_RESCHEDULER_EVENT, &message)
            .await
        {
            warn!(workload = %evictee_id, error = %e, "Error while emitting eviction event");
        }

        let grace = effective_grace(grace_period_seconds, evictee);
        api.delete_workload(&evictee.namespace, &evictee.name, grace)
            .await
            .map_err(|source| ReservationError::Evict {
                workload: evictee_id,
                source,
            })?;
        metrics.inc_deleted_workloads();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_grace_overrides_looser_grace() {
        let mut w = Workload::new("default", "web-1");
        w.termination_grace_period_seconds = Some(30);
        assert_eq!(effective_grace(10, &w), Some(10));
    }

    #[test]
    fn effective_grace_keeps_tighter_grace() {
        let mut w = Workload::new("default", "web-1");
        w.termination_grace_period_seconds = Some(5);
        assert_eq!(effective_grace(10, &w), None);
    }

    #[test]
    fn effective_grace_applies_when_workload_has_none() {
        let w = Workload::new("default", "web-1");
        assert_eq!(effective_grace(10, &w), Some(10));
    }

    #[test]
    fn negative_configured_grace_never_overrides() {
        let mut w = Workload::new("default", "web-1");
        assert_eq!(effective_grace(-1, &w), None);

        w.termination_grace_period_seconds = Some(300);
        assert_eq!(effective_grace(-1, &w), None);
    }

    #[test]
    fn zero_grace_means_immediate_termination() {
        let mut w = Workload::new("default", "web-1");
        w.termination_grace_period_seconds = Some(30);
        assert_eq!(effective_grace(0, &w), Some(0));
    }

    #[test]
    fn legacy_strip_preserves_other_taints() {
        let raw = r#"[
            {"key":"CriticalAddonsOnly","value":"old/x","effect":"NoSchedule"},
            {"key":"other","value":"v","effect":"NoSchedule"}
        ]"#;

        let stripped = strip_legacy_reservation_taints(raw).unwrap().unwrap();
        let kept: Vec<Taint> = serde_json::from_str(&stripped).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "other");
    }

    #[test]
    fn legacy_strip_is_idempotent() {
        let raw = r#"[{"key":"CriticalAddonsOnly","value":"old/x","effect":"NoSchedule"}]"#;

        let first = strip_legacy_reservation_taints(raw).unwrap().unwrap();
        assert_eq!(strip_legacy_reservation_taints(&first).unwrap(), None);
    }

    #[test]
    fn legacy_strip_leaves_unrelated_lists_alone() {
        let raw = r#"[{"key":"other","value":"v","effect":"NoExecute"}]"#;
        assert_eq!(strip_legacy_reservation_taints(raw).unwrap(), None);
    }
}
