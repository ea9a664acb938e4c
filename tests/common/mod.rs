//! In-memory cluster for driving the rescheduler in tests.
//!
//! Records node updates, deletions, and events so tests can assert on the
//! externally observable behavior of a tick.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rescheduler::cluster::{ClusterApi, ClusterError};
use rescheduler::metrics::Metrics;
use rescheduler::model::{
    Node, NodeCapacity, OwnerReference, Workload, CRITICAL_WORKLOAD_ANNOTATION,
    MIRROR_ANNOTATION,
};
use rescheduler::oracle::ResourceOracle;
use rescheduler::{Config, Rescheduler};

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    workloads: Vec<Workload>,
    node_updates: u64,
    deletions: Vec<(String, Option<i64>)>,
    events: Vec<(String, String)>,
    fail_deletes: bool,
}

/// A scriptable in-memory `ClusterApi`.
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<State>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node) {
        let mut state = self.state.lock().unwrap();
        state.nodes.insert(node.name.clone(), node);
    }

    pub fn add_workload(&self, workload: Workload) {
        self.state.lock().unwrap().workloads.push(workload);
    }

    /// Give a workload a node binding, as the primary scheduler would.
    pub fn bind_workload(&self, namespace: &str, name: &str, node: &str) {
        let mut state = self.state.lock().unwrap();
        for w in &mut state.workloads {
            if w.namespace == namespace && w.name == name {
                w.node_name = Some(node.to_string());
            }
        }
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub fn node(&self, name: &str) -> Node {
        self.state.lock().unwrap().nodes[name].clone()
    }

    pub fn node_update_count(&self) -> u64 {
        self.state.lock().unwrap().node_updates
    }

    /// Recorded deletions as `(workload id, grace override)`.
    pub fn deletions(&self) -> Vec<(String, Option<i64>)> {
        self.state.lock().unwrap().deletions.clone()
    }

    /// Recorded events as `(workload id, reason)`.
    pub fn events(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn workload_exists(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .workloads
            .iter()
            .any(|w| w.namespace == namespace && w.name == name)
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_ready_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn list_unscheduled_workloads(
        &self,
        namespace: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .workloads
            .iter()
            .filter(|w| w.namespace == namespace && w.node_name.is_none())
            .cloned()
            .collect())
    }

    async fn list_workloads_on_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .workloads
            .iter()
            .filter(|w| w.node_name.as_deref() == Some(node_name))
            .cloned()
            .collect())
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, ClusterError> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .iter()
            .find(|w| w.namespace == namespace && w.name == name)
            .cloned()
            .ok_or(ClusterError::Api {
                status: 404,
                body: format!("workload {namespace}/{name} not found"),
            })
    }

    async fn update_node(&self, node: &Node) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(&node.name) {
            return Err(ClusterError::Api {
                status: 404,
                body: format!("node {} not found", node.name),
            });
        }
        state.nodes.insert(node.name.clone(), node.clone());
        state.node_updates += 1;
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<i64>,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(ClusterError::Api {
                status: 500,
                body: "injected delete failure".to_string(),
            });
        }
        state
            .deletions
            .push((format!("{namespace}/{name}"), grace_period_seconds));
        state
            .workloads
            .retain(|w| !(w.namespace == namespace && w.name == name));
        Ok(())
    }

    async fn emit_event(
        &self,
        workload: &Workload,
        reason: &str,
        _message: &str,
    ) -> Result<(), ClusterError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push((workload.id(), reason.to_string()));
        Ok(())
    }
}

/// A node with the given CPU capacity (memory and slots effectively
/// unconstrained).
pub fn node_with_cpu(name: &str, cpu_millis: i64) -> Node {
    let mut node = Node::new(name);
    node.allocatable = NodeCapacity {
        cpu_millis,
        memory_bytes: i64::MAX,
        workload_slots: 110,
    };
    node
}

/// An evictable tenant bound to a node.
pub fn tenant_on(node: &str, name: &str, cpu_millis: i64) -> Workload {
    let mut w = Workload::new("default", name);
    w.node_name = Some(node.to_string());
    w.resources.cpu_millis = cpu_millis;
    w
}

/// An unscheduled critical daemon-managed workload in the system namespace.
pub fn critical_daemon(name: &str, cpu_millis: i64) -> Workload {
    let mut w = Workload::new("kube-system", name);
    w.annotations
        .insert(CRITICAL_WORKLOAD_ANNOTATION.to_string(), String::new());
    w.owner_references.push(OwnerReference {
        kind: "DaemonSet".to_string(),
        name: name.to_string(),
    });
    w.resources.cpu_millis = cpu_millis;
    w
}

/// A mirror workload bound to a node.
pub fn mirror_on(node: &str, name: &str, cpu_millis: i64) -> Workload {
    let mut w = tenant_on(node, name, cpu_millis);
    w.annotations
        .insert(MIRROR_ANNOTATION.to_string(), "mirror".to_string());
    w
}

/// Operator config for tests, with any extra flags appended.
pub fn test_config(extra: &[&str]) -> Config {
    use clap::Parser;

    let mut args = vec!["rescheduler", "--running-in-cluster=false"];
    args.extend_from_slice(extra);
    Config::parse_from(args)
}

/// A rescheduler wired to the mock cluster and the resource oracle.
pub fn rescheduler_for(
    api: Arc<MockCluster>,
    metrics: Arc<Metrics>,
    config: &Config,
) -> Rescheduler {
    Rescheduler::new(api, Arc::new(ResourceOracle::new()), metrics, config)
}
