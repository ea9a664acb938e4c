//! The In-Flight Set: workload identities currently holding a reservation.
//!
//! Shared between the control loop and waiter tasks; membership test, add,
//! and remove are serialized behind a mutex. The guard is never held across
//! an await point.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::model::Workload;

#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workload's identity. Returns false if it was already present.
    pub fn add(&self, workload: &Workload) -> bool {
        self.ids.lock().expect("in-flight lock").insert(workload.id())
    }

    /// Remove a workload's identity. Returns false if it was not present.
    pub fn remove(&self, workload: &Workload) -> bool {
        self.ids.lock().expect("in-flight lock").remove(&workload.id())
    }

    pub fn contains(&self, workload: &Workload) -> bool {
        self.contains_id(&workload.id())
    }

    /// Membership by identity string, as found in a taint value.
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.lock().expect("in-flight lock").contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().expect("in-flight lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
