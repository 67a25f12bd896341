//! In-process model of a replica set's administrative behaviour.
//!
//! [`SimulatedCluster`] holds the state the database would keep (active
//! configuration, its version, which member is primary, which hosts answer)
//! and hands out [`SimulatedNode`] handles that behave like an admin
//! connection to one host. Node handles share the cluster state, so a
//! reconfigure through one handle is visible through all others.
//!
//! Elections are not modelled beyond what configuration changes imply: the
//! initial primary is picked from priorities when the set is initiated, a
//! higher-priority member takes over after a reconfigure, and tests can force
//! any member to step up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::admin::{NodeRole, ReplicaSetAdmin};
use crate::config::ReplicaSetConfig;
use crate::error::AdminError;

#[derive(Debug, Default)]
struct ClusterState {
    /// Every known host and whether it currently answers.
    reachable: BTreeMap<String, bool>,
    config: Option<ReplicaSetConfig>,
    primary: Option<String>,
}

impl ClusterState {
    fn ensure_reachable(&self, host: &str) -> Result<(), AdminError> {
        match self.reachable.get(host) {
            Some(true) => Ok(()),
            Some(false) => Err(AdminError::unreachable(host, "host is down")),
            None => Err(AdminError::unreachable(host, "unknown host")),
        }
    }

    fn is_reachable(&self, host: &str) -> bool {
        self.reachable.get(host).copied().unwrap_or(false)
    }

    fn active_config(&self) -> Result<&ReplicaSetConfig, AdminError> {
        self.config.as_ref().ok_or(AdminError::NotInitialized)
    }

    /// Picks the reachable electable member with the highest priority.
    ///
    /// Ties go to `preferred` when it is among them, then to the lowest
    /// position.
    fn elect(&self, config: &ReplicaSetConfig, preferred: Option<&str>) -> Option<String> {
        let candidates: Vec<_> = config
            .members
            .iter()
            .filter(|m| m.priority > 0.0 && self.is_reachable(&m.host))
            .collect();
        let top = candidates
            .iter()
            .map(|m| m.priority)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut best = candidates.iter().filter(|m| m.priority == top);

        if let Some(host) = preferred {
            if best.clone().any(|m| m.host == host) {
                return Some(host.to_string());
            }
        }
        best.next().map(|m| m.host.clone())
    }
}

/// Shared state of a simulated replica set.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    /// Creates an uninitialized cluster whose `hosts` are all reachable.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reachable = hosts.into_iter().map(|h| (h.into(), true)).collect();
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                reachable,
                ..Default::default()
            })),
        }
    }

    /// Cluster made of the hosts named in `config`, not yet initiated.
    pub fn for_config(config: &ReplicaSetConfig) -> Self {
        Self::new(config.hosts())
    }

    /// Opens an admin handle to `host`.
    pub fn connect(&self, host: impl Into<String>) -> SimulatedNode {
        SimulatedNode {
            host: host.into(),
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> Option<ReplicaSetConfig> {
        self.lock().config.clone()
    }

    pub fn version(&self) -> Option<u64> {
        self.lock().config.as_ref().and_then(|c| c.version)
    }

    pub fn primary(&self) -> Option<String> {
        self.lock().primary.clone()
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        self.lock().reachable.insert(host.to_string(), reachable);
    }

    /// Makes `host` primary, as if it had won an election.
    pub fn step_up(&self, host: &str) -> Result<(), AdminError> {
        let mut state = self.lock();
        state.ensure_reachable(host)?;
        let config = state.active_config()?;
        match config.member_by_host(host) {
            Some(member) if member.priority > 0.0 => {}
            Some(_) => {
                return Err(AdminError::invalid(format!(
                    "{host} has priority 0 and cannot become primary"
                )))
            }
            None => {
                return Err(AdminError::invalid(format!(
                    "{host} is not a member of the replica set"
                )))
            }
        }
        debug!(host, "simulated step up");
        state.primary = Some(host.to_string());
        Ok(())
    }
}

/// Admin connection to one host of a [`SimulatedCluster`].
#[derive(Debug, Clone)]
pub struct SimulatedNode {
    host: String,
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedNode {
    pub fn host(&self) -> &str {
        &self.host
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReplicaSetAdmin for SimulatedNode {
    async fn initiate(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        let mut state = self.lock();
        state.ensure_reachable(&self.host)?;
        if state.config.is_some() {
            return Err(AdminError::AlreadyInitialized);
        }
        config.validate()?;
        if config.member_by_host(&self.host).is_none() {
            return Err(AdminError::invalid(format!(
                "no member of the configuration maps to {}",
                self.host
            )));
        }
        for host in config.hosts() {
            state.ensure_reachable(host)?;
        }

        let mut adopted = config.clone();
        adopted.version = Some(1);
        state.primary = state.elect(&adopted, Some(&self.host));
        debug!(set = %adopted.id, primary = ?state.primary, "simulated initiate");
        state.config = Some(adopted);
        Ok(())
    }

    async fn current_config(&self) -> Result<ReplicaSetConfig, AdminError> {
        let state = self.lock();
        state.ensure_reachable(&self.host)?;
        state.active_config().cloned()
    }

    async fn reconfigure(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        let mut state = self.lock();
        state.ensure_reachable(&self.host)?;
        let current = state.active_config()?;
        if state.primary.as_deref() != Some(self.host.as_str()) {
            return Err(AdminError::NotPrimary);
        }
        config.validate()?;
        if config.id != current.id {
            return Err(AdminError::invalid(format!(
                "set id {} does not match the active set {}",
                config.id, current.id
            )));
        }
        let Some(own_priority) = config.member_by_host(&self.host).map(|m| m.priority) else {
            return Err(AdminError::invalid(format!(
                "the new configuration removes the primary {}",
                self.host
            )));
        };

        let mut adopted = config.clone();
        adopted.version = Some(current.version.unwrap_or(0) + 1);

        // A member with a strictly higher priority takes over.
        if let Some(best) = state.elect(&adopted, Some(&self.host)) {
            let best_priority = adopted
                .member_by_host(&best)
                .map(|m| m.priority)
                .unwrap_or(0.0);
            if best_priority > own_priority {
                debug!(from = %self.host, to = %best, "simulated priority takeover");
                state.primary = Some(best);
            }
        }
        debug!(set = %adopted.id, version = ?adopted.version, "simulated reconfigure");
        state.config = Some(adopted);
        Ok(())
    }

    async fn role(&self) -> Result<NodeRole, AdminError> {
        let state = self.lock();
        state.ensure_reachable(&self.host)?;
        let Some(config) = state.config.as_ref() else {
            return Ok(NodeRole::Other);
        };
        if state.primary.as_deref() == Some(self.host.as_str()) {
            Ok(NodeRole::Primary)
        } else if config.member_by_host(&self.host).is_some() {
            Ok(NodeRole::Secondary)
        } else {
            Ok(NodeRole::Other)
        }
    }
}
