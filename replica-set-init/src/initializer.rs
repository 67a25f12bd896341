//! Bootstrap workflow for a replica set.
//!
//! A single forward pass: initiate the set, read the active configuration
//! back, apply the priority policy by position and resubmit it. There is no
//! retry and no branching on errors; whatever the cluster reports reaches the
//! caller unchanged so the operator can decide whether to rerun, and against
//! which node.

use tracing::{debug, info, warn};

use crate::admin::{NodeRole, ReplicaSetAdmin};
use crate::config::ReplicaSetConfig;
use crate::error::AdminError;
use crate::policy::PriorityPolicy;

/// Outcome of a completed [`TopologyInitializer::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct InitReport {
    /// Configuration submitted with `initiate`.
    pub initiated: ReplicaSetConfig,
    /// Configuration submitted with `reconfigure`, if one was needed.
    pub reprioritized: Option<ReplicaSetConfig>,
}

/// Drives the initiate → read → reweight → reconfigure sequence.
pub struct TopologyInitializer<A> {
    admin: A,
    policy: PriorityPolicy,
    skip_reprioritize: bool,
}

impl<A: ReplicaSetAdmin> TopologyInitializer<A> {
    pub fn new(admin: A) -> Self {
        Self {
            admin,
            policy: PriorityPolicy::default(),
            skip_reprioritize: false,
        }
    }

    pub fn with_policy(mut self, policy: PriorityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop after `initiate`; the priorities are left as submitted.
    pub fn skip_reprioritize(mut self, skip: bool) -> Self {
        self.skip_reprioritize = skip;
        self
    }

    pub fn admin(&self) -> &A {
        &self.admin
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    pub async fn initiate(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        config.validate()?;
        if !config.is_contiguous() {
            warn!(set = %config.id, "member ids are not numbered 0, 1, 2, ...");
        }
        info!(
            set = %config.id,
            members = ?config.hosts(),
            priorities = ?config.priorities(),
            "initiating replica set"
        );
        self.admin.initiate(config).await?;
        info!(set = %config.id, "replica set initiated");
        Ok(())
    }

    pub async fn read_current_config(&self) -> Result<ReplicaSetConfig, AdminError> {
        let config = self.admin.current_config().await?;
        debug!(
            set = %config.id,
            version = ?config.version,
            members = ?config.hosts(),
            "read active configuration"
        );
        Ok(config)
    }

    pub async fn reconfigure(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        config.validate()?;
        info!(
            set = %config.id,
            from_version = ?config.version,
            priorities = ?config.priorities(),
            "reconfiguring replica set"
        );
        self.admin.reconfigure(config).await?;
        info!(set = %config.id, "replica set reconfigured");
        Ok(())
    }

    /// Applies the priority policy to the active configuration.
    ///
    /// Returns the submitted configuration, or `None` when the active one
    /// already carries the policy's weights and nothing was sent.
    pub async fn reprioritize(&self) -> Result<Option<ReplicaSetConfig>, AdminError> {
        let mut config = self.read_current_config().await?;
        if self.policy.is_satisfied_by(&config) {
            info!(
                set = %config.id,
                policy = %self.policy,
                "priorities already match policy, skipping reconfigure"
            );
            return Ok(None);
        }

        match self.admin.role().await {
            Ok(NodeRole::Primary) => {}
            Ok(role) => warn!(%role, "connected node is not primary, reconfigure will be refused"),
            Err(err) => warn!(error = %err, "could not determine node role"),
        }

        self.policy.apply(&mut config)?;
        self.reconfigure(&config).await?;
        Ok(Some(config))
    }

    pub async fn run(&self, config: &ReplicaSetConfig) -> Result<InitReport, AdminError> {
        self.initiate(config).await?;
        let reprioritized = if self.skip_reprioritize {
            debug!("priority correction disabled");
            None
        } else {
            self.reprioritize().await?
        };
        Ok(InitReport {
            initiated: config.clone(),
            reprioritized,
        })
    }
}
