//! Workload classification predicates.
//!
//! All predicates are pure functions over workload snapshots. The composite
//! is [`is_critical`]: resident in the system namespace and either marked
//! by the critical annotation (empty string value) or carrying a priority
//! at or above the system-critical threshold.

use std::collections::BTreeMap;

use crate::model::{
    Workload, CRITICAL_WORKLOAD_ANNOTATION, MIRROR_ANNOTATION, SYSTEM_CRITICAL_PRIORITY,
};

/// Whether the annotation set bears the critical marker with an empty value.
pub fn has_critical_annotation(annotations: &BTreeMap<String, String>) -> bool {
    matches!(
        annotations.get(CRITICAL_WORKLOAD_ANNOTATION),
        Some(v) if v.is_empty()
    )
}

/// Whether a priority value is in the system-critical range.
pub fn is_critical_priority(priority: i32) -> bool {
    priority >= SYSTEM_CRITICAL_PRIORITY
}

/// Whether the workload is critical: system-namespaced and marked either by
/// annotation or by priority.
pub fn is_critical(workload: &Workload, system_namespace: &str) -> bool {
    workload.namespace == system_namespace
        && (has_critical_annotation(&workload.annotations)
            || workload.priority.is_some_and(is_critical_priority))
}

/// Whether the workload is mirrored from a node-local declaration.
pub fn is_mirror(workload: &Workload) -> bool {
    workload.annotations.contains_key(MIRROR_ANNOTATION)
}

/// Whether the workload is owned by a daemon controller.
pub fn is_daemon_managed(workload: &Workload) -> bool {
    workload
        .owner_references
        .iter()
        .any(|r| r.kind == "DaemonSet")
}

/// Whether the workload must never be evicted by the rescheduler.
pub fn is_protected(workload: &Workload, system_namespace: &str) -> bool {
    is_mirror(workload) || is_daemon_managed(workload) || is_critical(workload, system_namespace)
}
