//! Per-node admission simulator.
//!
//! Given a candidate node and a critical workload, decides which residents
//! must be evicted for the critical workload to fit. The simulation walks
//! a copy of the node's occupancy; the real node is never touched here.

use tracing::debug;

use crate::classify;
use crate::model::{Node, Workload};
use crate::oracle::{FeasibilityOracle, UnfitReason};

/// Decide which residents of `node` must be evicted so that `critical` fits.
///
/// Residents are partitioned into protected and evictable. The critical
/// workload must fit alongside the protected set alone, otherwise the node
/// is rejected. Evictable residents are then re-admitted one by one in
/// input order against the growing simulated occupancy; those that no
/// longer fit become evictees.
///
/// An empty evictee list is a success: the node can host the critical
/// workload without touching anyone.
pub fn plan_admission(
    node: &Node,
    residents: &[Workload],
    critical: &Workload,
    oracle: &dyn FeasibilityOracle,
    system_namespace: &str,
) -> Result<Vec<Workload>, UnfitReason> {
    let (protected, evictable): (Vec<&Workload>, Vec<&Workload>) = residents
        .iter()
        .partition(|w| classify::is_protected(w, system_namespace));

    // Occupancy the critical workload must fit into no matter what.
    let mut simulated: Vec<Workload> = protected.into_iter().cloned().collect();
    oracle.fits(node, &simulated, critical)?;

    simulated.push(critical.clone());

    let mut evictees = Vec::new();
    for resident in evictable {
        match oracle.fits(node, &simulated, resident) {
            Ok(()) => simulated.push(resident.clone()),
            Err(reason) => {
                debug!(
                    node = %node.name,
                    workload = %resident.id(),
                    reason = %reason,
                    "Resident no longer fits in simulation"
                );
                evictees.push(resident.clone());
            }
        }
    }

    Ok(evictees)
}
