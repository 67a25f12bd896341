//! Replica set bootstrap for the todo application's MongoDB pair.
//!
//! The workflow is deliberately flat: submit the initial membership, read the
//! active configuration back, weight the members by position (the first one
//! preferred as primary) and resubmit. Election, replication and failover all
//! belong to the database; this crate only sends configuration intents.
//!
//! - [`config`] describes the replica set document and validates it.
//! - [`policy`] holds the positional priority weights.
//! - [`admin`] is the administrative interface the workflow talks to.
//! - [`initializer`] runs initiate → read → reweight → reconfigure.
//! - [`mongo`] implements the interface with the MongoDB driver.
//! - [`simulation`] implements it with an in-process cluster model, which the
//!   tests use in place of a database.
//! - [`cli`] parses the command-line interface of the binary.

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod initializer;
pub mod mongo;
pub mod policy;
pub mod simulation;

pub use admin::{NodeRole, ReplicaSetAdmin};
pub use config::{MemberDescriptor, ReplicaSetConfig};
pub use error::AdminError;
pub use initializer::{InitReport, TopologyInitializer};
pub use policy::PriorityPolicy;
