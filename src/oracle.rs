//! Feasibility oracle seam.
//!
//! The rescheduler's correctness does not depend on any particular predicate
//! list, only on the oracle being deterministic within a tick for a fixed
//! `(node, residents, candidate)` input. [`ResourceOracle`] is the default
//! implementation: a candidate fits iff the summed resource requests of the
//! residents plus the candidate stay within the node's allocatable capacity.

use thiserror::Error;

use crate::model::{Node, Workload};

/// Why a candidate workload does not fit on a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnfitReason {
    #[error("insufficient cpu: requested {requested_millis}m, free {free_millis}m")]
    InsufficientCpu {
        requested_millis: i64,
        free_millis: i64,
    },

    #[error("insufficient memory: requested {requested_bytes}, free {free_bytes}")]
    InsufficientMemory {
        requested_bytes: i64,
        free_bytes: i64,
    },

    #[error("no free workload slots ({occupied}/{slots})")]
    NoFreeSlots { occupied: i64, slots: i64 },
}

/// Answers: would `candidate` schedule on `node` given `residents`?
///
/// Must be pure with respect to the rescheduler and is called many times
/// per tick.
pub trait FeasibilityOracle: Send + Sync {
    fn fits(
        &self,
        node: &Node,
        residents: &[Workload],
        candidate: &Workload,
    ) -> Result<(), UnfitReason>;
}

/// Capacity-based oracle over CPU, memory, and workload-slot dimensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceOracle;

impl ResourceOracle {
    pub fn new() -> Self {
        Self
    }
}

impl FeasibilityOracle for ResourceOracle {
    fn fits(
        &self,
        node: &Node,
        residents: &[Workload],
        candidate: &Workload,
    ) -> Result<(), UnfitReason> {
        let occupied = residents.len() as i64;
        if occupied + 1 > node.allocatable.workload_slots {
            return Err(UnfitReason::NoFreeSlots {
                occupied,
                slots: node.allocatable.workload_slots,
            });
        }

        let used_cpu: i64 = residents.iter().map(|w| w.resources.cpu_millis).sum();
        let free_cpu = node.allocatable.cpu_millis - used_cpu;
        if candidate.resources.cpu_millis > free_cpu {
            return Err(UnfitReason::InsufficientCpu {
                requested_millis: candidate.resources.cpu_millis,
                free_millis: free_cpu,
            });
        }

        let used_memory: i64 = residents.iter().map(|w| w.resources.memory_bytes).sum();
        let free_memory = node.allocatable.memory_bytes - used_memory;
        if candidate.resources.memory_bytes > free_memory {
            return Err(UnfitReason::InsufficientMemory {
                requested_bytes: candidate.resources.memory_bytes,
                free_bytes: free_memory,
            });
        }

        Ok(())
    }
}
