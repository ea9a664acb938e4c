//! Core data model: workloads, nodes, taints.
//!
//! Objects fetched from the cluster API are treated as immutable snapshots.
//! Anything sent back through `update_node` is built from a clone; nothing
//! in this crate mutates a fetched object in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Annotation marking a workload as critical (empty string value required).
pub const CRITICAL_WORKLOAD_ANNOTATION: &str = "scheduler.alpha.kubernetes.io/critical-pod";

/// Annotation present on mirror workloads (node-local declarations).
pub const MIRROR_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Key of the reservation taint placed on nodes while capacity is held.
pub const CRITICAL_ADDONS_ONLY_TAINT_KEY: &str = "CriticalAddonsOnly";

/// Node annotation that held JSON-serialized taints before taints became a
/// structured field. Consumed once at startup for cleanup.
pub const LEGACY_TAINTS_ANNOTATION_KEY: &str = "scheduler.alpha.kubernetes.io/taints";

/// Label whose value names the application for metrics purposes.
pub const APP_NAME_LABEL: &str = "k8s-app";

/// Highest priority assignable to user workloads; everything above is
/// reserved for system use.
pub const HIGHEST_USER_DEFINABLE_PRIORITY: i32 = 1_000_000_000;

/// Priority at or above which a workload is implicitly critical.
pub const SYSTEM_CRITICAL_PRIORITY: i32 = 2 * HIGHEST_USER_DEFINABLE_PRIORITY;

/// The reserved namespace scanned for critical workloads by default.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kube-system";

/// Taint effect. Only `NoSchedule` is of interest to the rescheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// A node taint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: TaintEffect,
}

impl Taint {
    /// The reservation taint for a critical workload identity.
    pub fn reservation(workload_id: &str) -> Self {
        Self {
            key: CRITICAL_ADDONS_ONLY_TAINT_KEY.to_string(),
            value: workload_id.to_string(),
            effect: TaintEffect::NoSchedule,
        }
    }

    /// Whether this is a critical-reservation taint (any value).
    pub fn is_reservation(&self) -> bool {
        self.key == CRITICAL_ADDONS_ONLY_TAINT_KEY
    }
}

/// Reference from a workload to its owning controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

/// Resource requests carried by a workload, consumed by the default
/// feasibility oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequests {
    /// Requested CPU in millicores.
    #[serde(default)]
    pub cpu_millis: i64,

    /// Requested memory in bytes.
    #[serde(default)]
    pub memory_bytes: i64,
}

/// A scheduled unit as seen through the cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,

    /// Scheduling priority, if the workload carries one.
    #[serde(default)]
    pub priority: Option<i32>,

    /// Name of the node the workload is bound to, once scheduled.
    #[serde(default)]
    pub node_name: Option<String>,

    /// The workload's own termination grace in seconds, if set.
    #[serde(default)]
    pub termination_grace_period_seconds: Option<i64>,

    #[serde(default)]
    pub resources: ResourceRequests,
}

impl Workload {
    /// A workload with the given identity and everything else empty.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner_references: vec![],
            priority: None,
            node_name: None,
            termination_grace_period_seconds: None,
            resources: ResourceRequests::default(),
        }
    }

    /// The workload identity `namespace/name`, used as the reservation
    /// taint value and as the In-Flight Set key.
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Application name for metrics labels, from the well-known label.
    pub fn app_name(&self) -> &str {
        self.labels
            .get(APP_NAME_LABEL)
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Allocatable capacity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    /// Allocatable CPU in millicores.
    pub cpu_millis: i64,

    /// Allocatable memory in bytes.
    pub memory_bytes: i64,

    /// Maximum number of workloads the node accepts.
    pub workload_slots: i64,
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self {
            cpu_millis: 0,
            memory_bytes: 0,
            workload_slots: 110,
        }
    }
}

/// A ready host as seen through the cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    #[serde(default)]
    pub taints: Vec<Taint>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub allocatable: NodeCapacity,
}

impl Node {
    /// A node with the given name, no taints, and default capacity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            taints: vec![],
            annotations: BTreeMap::new(),
            allocatable: NodeCapacity::default(),
        }
    }

    /// Whether the node carries any critical-reservation taint.
    pub fn has_reservation_taint(&self) -> bool {
        self.taints.iter().any(Taint::is_reservation)
    }
}
