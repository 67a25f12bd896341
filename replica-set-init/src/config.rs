//! Replica set membership description.
//!
//! The serialized form is the database's own configuration document, so the
//! same JSON can be handed to the `--config` flag, printed for the operator,
//! or converted to BSON for the admin commands.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AdminError;

/// Priority the database assigns when a member does not specify one.
pub const DEFAULT_PRIORITY: f64 = 1.0;

/// Highest priority the database accepts for a member.
pub const MAX_PRIORITY: f64 = 1000.0;

/// Identifier of the replica set backing the todo application.
pub const TODOAPP_SET_ID: &str = "todoapp-replica-set";

fn default_priority() -> f64 {
    DEFAULT_PRIORITY
}

/// One member of the replica set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Stable member id, unique within the set.
    #[serde(rename = "_id")]
    pub id: u8,
    /// `hostname:port` the other members use to reach this one.
    pub host: String,
    /// Election weight; 0 means the member never becomes primary.
    #[serde(default = "default_priority")]
    pub priority: f64,
}

impl MemberDescriptor {
    pub fn new(id: u8, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }
}

/// Full membership description of a replica set.
///
/// Member order is significant: positions are what the priority policy
/// refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSetConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub members: Vec<MemberDescriptor>,
    /// Version assigned by the cluster. Only present on configurations read
    /// back from a running set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ReplicaSetConfig {
    pub fn new(id: impl Into<String>, members: Vec<MemberDescriptor>) -> Self {
        Self {
            id: id.into(),
            members,
            version: None,
        }
    }

    /// The two-node set used by the todo application.
    pub fn todoapp() -> Self {
        Self::new(
            TODOAPP_SET_ID,
            vec![
                MemberDescriptor::new(0, "mongo-primary:27017"),
                MemberDescriptor::new(1, "mongo-secondary:27017"),
            ],
        )
    }

    /// Reads a configuration document from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.host.as_str()).collect()
    }

    pub fn priorities(&self) -> Vec<f64> {
        self.members.iter().map(|m| m.priority).collect()
    }

    pub fn member_by_host(&self, host: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.host == host)
    }

    /// Whether member ids follow the 0, 1, 2, … convention.
    pub fn is_contiguous(&self) -> bool {
        self.members
            .iter()
            .enumerate()
            .all(|(pos, m)| usize::from(m.id) == pos)
    }

    /// Same set id and members, ignoring the cluster-assigned version.
    pub fn same_membership(&self, other: &Self) -> bool {
        self.id == other.id && self.members == other.members
    }

    /// Checks the rules the database enforces on a submitted configuration.
    pub fn validate(&self) -> Result<(), AdminError> {
        if self.id.trim().is_empty() {
            return Err(AdminError::invalid("replica set id must not be empty"));
        }
        if self.members.is_empty() {
            return Err(AdminError::invalid("at least one member is required"));
        }

        let mut ids = HashSet::new();
        let mut hosts = HashSet::new();
        for member in &self.members {
            if !ids.insert(member.id) {
                return Err(AdminError::invalid(format!(
                    "duplicate member id {}",
                    member.id
                )));
            }
            validate_host(&member.host)?;
            if !hosts.insert(member.host.to_ascii_lowercase()) {
                return Err(AdminError::invalid(format!(
                    "duplicate member host {}",
                    member.host
                )));
            }
            if !member.priority.is_finite() || !(0.0..=MAX_PRIORITY).contains(&member.priority) {
                return Err(AdminError::invalid(format!(
                    "member {} has priority {} outside 0..={MAX_PRIORITY}",
                    member.id, member.priority
                )));
            }
        }

        if self.members.iter().all(|m| m.priority == 0.0) {
            return Err(AdminError::invalid(
                "at least one member must have a priority above 0",
            ));
        }
        Ok(())
    }
}

fn validate_host(host: &str) -> Result<(), AdminError> {
    let Some((name, port)) = host.rsplit_once(':') else {
        return Err(AdminError::invalid(format!(
            "host '{host}' must have the form hostname:port"
        )));
    };
    if name.is_empty() {
        return Err(AdminError::invalid(format!("host '{host}' has no hostname")));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(AdminError::invalid(format!(
            "host '{host}' has an invalid port"
        ))),
    }
}
