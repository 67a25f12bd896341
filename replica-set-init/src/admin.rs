//! Administrative interface of a replica set.
//!
//! The initializer only ever talks to the cluster through [`ReplicaSetAdmin`].
//! [`crate::mongo::MongoAdmin`] implements it against a live database and
//! [`crate::simulation::SimulatedNode`] against an in-process model.

use std::fmt;

use async_trait::async_trait;

use crate::config::ReplicaSetConfig;
use crate::error::AdminError;

/// Replication role of the node a handle is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Primary,
    Secondary,
    /// Not initialized, recovering, arbiter, …
    Other,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Primary => "PRIMARY",
            NodeRole::Secondary => "SECONDARY",
            NodeRole::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// Commands a connected node accepts for replica-set administration.
#[async_trait]
pub trait ReplicaSetAdmin: Send + Sync {
    /// Adopts `config` as the first configuration of the set.
    async fn initiate(&self, config: &ReplicaSetConfig) -> Result<(), AdminError>;

    /// Returns the active configuration as seen by the connected node.
    async fn current_config(&self) -> Result<ReplicaSetConfig, AdminError>;

    /// Replaces the active configuration. Only the primary accepts this.
    async fn reconfigure(&self, config: &ReplicaSetConfig) -> Result<(), AdminError>;

    async fn role(&self) -> Result<NodeRole, AdminError>;
}
