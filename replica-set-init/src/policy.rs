//! Positional priority weighting.

use std::fmt;
use std::str::FromStr;

use crate::config::ReplicaSetConfig;
use crate::error::AdminError;

/// Fixed priority weights assigned to members by position.
///
/// The default prefers position 0 as primary and keeps position 1 electable
/// but deprioritized.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityPolicy {
    weights: Vec<f64>,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            weights: vec![1.0, 0.5],
        }
    }
}

impl PriorityPolicy {
    pub fn new(weights: Vec<f64>) -> Result<Self, AdminError> {
        if weights.is_empty() {
            return Err(AdminError::invalid("priority policy needs at least one weight"));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(AdminError::invalid(format!("invalid priority weight {bad}")));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Writes each weight into the member at the same position.
    ///
    /// Members past the last weight keep their priority.
    pub fn apply(&self, config: &mut ReplicaSetConfig) -> Result<(), AdminError> {
        if config.members.len() < self.weights.len() {
            return Err(AdminError::invalid(format!(
                "priority policy covers {} members but the set has {}",
                self.weights.len(),
                config.members.len()
            )));
        }
        for (member, weight) in config.members.iter_mut().zip(&self.weights) {
            member.priority = *weight;
        }
        Ok(())
    }

    pub fn is_satisfied_by(&self, config: &ReplicaSetConfig) -> bool {
        config.members.len() >= self.weights.len()
            && config
                .members
                .iter()
                .zip(&self.weights)
                .all(|(member, weight)| member.priority == *weight)
    }
}

impl FromStr for PriorityPolicy {
    type Err = AdminError;

    /// Parses a comma separated list such as `1,0.5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let weights = s
            .split(',')
            .map(str::trim)
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| AdminError::invalid(format!("invalid priority weight '{part}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(weights)
    }
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.weights.iter().map(f64::to_string).collect();
        f.write_str(&parts.join(","))
    }
}
