//! Process-level configuration for the agent

use std::time::Duration;

use crate::controller::NRT_FINALIZER;
use crate::crd::{NODE_NAME_LABEL, ROUTE_REALM};
use crate::error::{Error, Result};

/// Default delay before a failed pass is retried
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 10;

/// Default period of the timer-driven pass
pub const DEFAULT_PERIODIC_RECONCILIATION_INTERVAL_SECS: u64 = 30;

/// Configuration injected into the reconciler at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Node this agent manages; must match the kubelet's node name
    pub node_name: String,
    /// Delay applied when a pass asks to be requeued
    pub requeue_interval: Duration,
    /// Period of the timer-driven pass, `None` disables it
    pub periodic_reconciliation_interval: Option<Duration>,
    /// Realm tag marking agent-owned kernel routes
    pub realm: u32,
    /// Finalizer owned by the agent
    pub finalizer: String,
    /// Label used to select NRTs bound to this node
    pub node_name_label: String,
    /// Delete realm-tagged routes that no NRT desires
    pub cleanup_orphan_routes: bool,
}

impl AgentConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            periodic_reconciliation_interval: Some(Duration::from_secs(
                DEFAULT_PERIODIC_RECONCILIATION_INTERVAL_SECS,
            )),
            realm: ROUTE_REALM,
            finalizer: NRT_FINALIZER.to_string(),
            node_name_label: NODE_NAME_LABEL.to_string(),
            cleanup_orphan_routes: true,
        }
    }

    /// Requeue interval given in whole seconds
    pub fn with_requeue_interval_secs(mut self, secs: u64) -> Self {
        self.requeue_interval = Duration::from_secs(secs);
        self
    }

    /// Periodic pass interval in whole seconds; zero disables the timer
    pub fn with_periodic_interval_secs(mut self, secs: u64) -> Self {
        self.periodic_reconciliation_interval = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn with_orphan_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_orphan_routes = enabled;
        self
    }

    /// Label selector matching NRTs bound to this node
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.node_name_label, self.node_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(Error::ConfigError("node name must not be empty".to_string()));
        }
        if self.requeue_interval.is_zero() {
            return Err(Error::ConfigError(
                "requeue interval must be greater than zero".to_string(),
            ));
        }
        if self.realm == 0 {
            return Err(Error::ConfigError("route realm must be non-zero".to_string()));
        }
        if self.finalizer.is_empty() || self.node_name_label.is_empty() {
            return Err(Error::ConfigError(
                "finalizer and node name label must be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::new("node1");
        assert_eq!(cfg.realm, 216);
        assert_eq!(cfg.finalizer, "routing-tables-manager.network.deckhouse.io");
        assert_eq!(
            cfg.label_selector(),
            "routing-manager.network.deckhouse.io/node-name=node1"
        );
        assert_eq!(cfg.requeue_interval, Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_periodic_interval_disables_timer() {
        let cfg = AgentConfig::new("node1").with_periodic_interval_secs(0);
        assert!(cfg.periodic_reconciliation_interval.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(AgentConfig::new("").validate().is_err());
        assert!(AgentConfig::new("node1")
            .with_requeue_interval_secs(0)
            .validate()
            .is_err());

        let mut cfg = AgentConfig::new("node1");
        cfg.realm = 0;
        assert!(cfg.validate().is_err());
    }
}
