//! Operator flag surface.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::model::DEFAULT_SYSTEM_NAMESPACE;

/// Out-of-band rescheduler that makes room for critical workloads.
#[derive(Debug, Clone, Parser)]
#[command(name = "rescheduler")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Use the in-cluster API configuration (service environment plus the
    /// mounted service-account token). Disable for local runs.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub running_in_cluster: bool,

    /// Content type of requests sent to the API server.
    #[arg(long, default_value = "application/vnd.kubernetes.protobuf")]
    pub kube_api_content_type: String,

    /// How often the rescheduler takes actions, in seconds.
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    pub housekeeping_interval: u64,

    /// Namespace to watch for critical workloads.
    #[arg(long, default_value = DEFAULT_SYSTEM_NAMESPACE)]
    pub system_namespace: String,

    /// How long to wait after start so existing critical workloads have a
    /// chance to start on their own, in seconds.
    #[arg(long, default_value_t = 120, value_name = "SECONDS")]
    pub initial_delay: u64,

    /// How long to wait for a critical workload to be scheduled after
    /// evicting workloads to make a spot for it, in seconds.
    #[arg(long, default_value_t = 600, value_name = "SECONDS")]
    pub pod_scheduled_timeout: u64,

    /// Address to listen on for serving metrics.
    #[arg(long, default_value = "127.0.0.1:9235")]
    pub listen_address: SocketAddr,

    /// How long to wait for evicted workloads to terminate, in seconds.
    /// Negative keeps each workload's own grace; 0 terminates immediately.
    #[arg(long, default_value_t = 10, value_name = "SECONDS", allow_hyphen_values = true)]
    pub grace_period: i64,
}

impl Config {
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay)
    }

    pub fn pod_scheduled_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_scheduled_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::parse_from(["rescheduler"]);

        assert!(config.running_in_cluster);
        assert_eq!(
            config.kube_api_content_type,
            "application/vnd.kubernetes.protobuf"
        );
        assert_eq!(config.housekeeping_interval(), Duration::from_secs(10));
        assert_eq!(config.system_namespace, "kube-system");
        assert_eq!(config.initial_delay(), Duration::from_secs(120));
        assert_eq!(config.pod_scheduled_timeout(), Duration::from_secs(600));
        assert_eq!(config.listen_address.to_string(), "127.0.0.1:9235");
        assert_eq!(config.grace_period, 10);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from([
            "rescheduler",
            "--running-in-cluster=false",
            "--housekeeping-interval",
            "30",
            "--system-namespace",
            "platform-system",
            "--grace-period",
            "-1",
        ]);

        assert!(!config.running_in_cluster);
        assert_eq!(config.housekeeping_interval(), Duration::from_secs(30));
        assert_eq!(config.system_namespace, "platform-system");
        assert_eq!(config.grace_period, -1);
    }
}
