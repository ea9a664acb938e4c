//! Cluster API client.
//!
//! The rescheduler consumes the cluster through the [`ClusterApi`] trait:
//! read-only listers for nodes and workloads, full-object node updates,
//! workload deletion with an optional grace override, and an event sink.
//! Conflict resolution for node updates is the API server's own optimistic
//! concurrency; the rescheduler only ever sends mutated clones.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::model::{Node, Workload};

/// Path of the token mounted into in-cluster deployments.
const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Base URL override for out-of-cluster runs.
const API_URL_ENV: &str = "RESCHEDULER_API_URL";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from cluster API calls.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// A human-readable event attached to a workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub component: String,
    pub namespace: String,
    pub involved_object: String,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The cluster surface the rescheduler depends on.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Nodes that are ready to accept workloads.
    async fn list_ready_nodes(&self) -> Result<Vec<Node>, ClusterError>;

    /// Workloads in `namespace` that lack a node binding.
    async fn list_unscheduled_workloads(
        &self,
        namespace: &str,
    ) -> Result<Vec<Workload>, ClusterError>;

    /// Workloads currently bound to `node_name`, in any namespace.
    async fn list_workloads_on_node(&self, node_name: &str)
        -> Result<Vec<Workload>, ClusterError>;

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, ClusterError>;

    /// Persist a full node object (taints and annotations included).
    async fn update_node(&self, node: &Node) -> Result<(), ClusterError>;

    /// Delete a workload, optionally overriding its termination grace.
    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<i64>,
    ) -> Result<(), ClusterError>;

    /// Emit a human-readable event on a workload.
    async fn emit_event(
        &self,
        workload: &Workload,
        reason: &str,
        message: &str,
    ) -> Result<(), ClusterError>;
}

/// HTTP implementation of [`ClusterApi`].
pub struct HttpClusterClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterClient {
    /// Build a client from the operator configuration.
    ///
    /// In-cluster mode derives the API endpoint from the conventional
    /// service environment and authenticates with the mounted
    /// service-account token; out-of-cluster mode reads the endpoint from
    /// `RESCHEDULER_API_URL`.
    pub fn from_config(config: &Config) -> Result<Self, ClusterError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&config.kube_api_content_type)
                .map_err(|e| ClusterError::InvalidConfig(format!("content type: {e}")))?,
        );

        let base_url = if config.running_in_cluster {
            let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
                ClusterError::InvalidConfig(
                    "running in cluster but KUBERNETES_SERVICE_HOST is not set".to_string(),
                )
            })?;
            let port = std::env::var("KUBERNETES_SERVICE_PORT")
                .unwrap_or_else(|_| "443".to_string());

            let token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH).map_err(|e| {
                ClusterError::InvalidConfig(format!("reading service account token: {e}"))
            })?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|e| ClusterError::InvalidConfig(format!("token header: {e}")))?;
            headers.insert(AUTHORIZATION, bearer);

            format!("https://{host}:{port}")
        } else {
            std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string())
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClusterError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClusterError::Api { status, body })
    }
}

#[async_trait]
impl ClusterApi for HttpClusterClient {
    async fn list_ready_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let url = format!("{}/v1/nodes?ready=true", self.base_url);
        debug!(url = %url, "Listing ready nodes");

        let response = Self::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn list_unscheduled_workloads(
        &self,
        namespace: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        let url = format!(
            "{}/v1/namespaces/{}/workloads?unscheduled=true",
            self.base_url, namespace
        );
        debug!(url = %url, "Listing unscheduled workloads");

        let response = Self::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn list_workloads_on_node(
        &self,
        node_name: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        let url = format!("{}/v1/nodes/{}/workloads", self.base_url, node_name);
        debug!(url = %url, "Listing workloads on node");

        let response = Self::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Workload, ClusterError> {
        let url = format!(
            "{}/v1/namespaces/{}/workloads/{}",
            self.base_url, namespace, name
        );

        let response = Self::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn update_node(&self, node: &Node) -> Result<(), ClusterError> {
        let url = format!("{}/v1/nodes/{}", self.base_url, node.name);
        debug!(node = %node.name, "Updating node");

        Self::check(self.client.put(&url).json(node).send().await?).await?;
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: Option<i64>,
    ) -> Result<(), ClusterError> {
        let mut url = format!(
            "{}/v1/namespaces/{}/workloads/{}",
            self.base_url, namespace, name
        );
        if let Some(grace) = grace_period_seconds {
            url.push_str(&format!("?grace_period_seconds={grace}"));
        }
        debug!(workload = %format!("{namespace}/{name}"), grace = ?grace_period_seconds, "Deleting workload");

        Self::check(self.client.delete(&url).send().await?).await?;
        Ok(())
    }

    async fn emit_event(
        &self,
        workload: &Workload,
        reason: &str,
        message: &str,
    ) -> Result<(), ClusterError> {
        let url = format!("{}/v1/events", self.base_url);
        let event = Event {
            component: "rescheduler".to_string(),
            namespace: workload.namespace.clone(),
            involved_object: workload.id(),
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };

        Self::check(self.client.post(&url).json(&event).send().await?).await?;
        Ok(())
    }
}
