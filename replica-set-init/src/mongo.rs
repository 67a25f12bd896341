//! [`ReplicaSetAdmin`] backed by a live MongoDB node.
//!
//! All commands run against the `admin` database of the node named in the
//! connection string. Use `directConnection=true` when talking to a node that
//! has not been initiated yet, otherwise server selection never finds it.

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::debug;

use crate::admin::{NodeRole, ReplicaSetAdmin};
use crate::config::{MemberDescriptor, ReplicaSetConfig};
use crate::error::AdminError;

/// Connection string used when none is given.
pub const DEFAULT_URI: &str = "mongodb://mongo-primary:27017/?directConnection=true";

const APP_NAME: &str = "replica-set-init";

// Server error codes, see src/mongo/base/error_codes.yml in the server tree.
const CODE_INVALID_REPLICA_SET_CONFIG: i32 = 93;
const CODE_NOT_YET_INITIALIZED: i32 = 94;
const CODE_NEW_REPLICA_SET_CONFIGURATION_INCOMPATIBLE: i32 = 103;
const CODE_ALREADY_INITIALIZED: i32 = 23;
const CODE_PRIMARY_STEPPED_DOWN: i32 = 189;
const CODE_NOT_WRITABLE_PRIMARY: i32 = 10107;
const CODE_NOT_PRIMARY_NO_SECONDARY_OK: i32 = 13435;
const CODE_NOT_PRIMARY_OR_SECONDARY: i32 = 13436;
const CODE_INTERRUPTED_DUE_TO_REPL_STATE_CHANGE: i32 = 11602;

/// Admin connection to one MongoDB node.
#[derive(Debug, Clone)]
pub struct MongoAdmin {
    admin_db: Database,
    target: String,
}

impl MongoAdmin {
    /// Parses `uri` and prepares a client. No network traffic happens until
    /// the first command.
    pub async fn connect(uri: &str) -> Result<Self, AdminError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(APP_NAME.to_string());
        let target = options
            .hosts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let client = Client::with_options(options)?;
        debug!(%target, "mongodb client ready");
        Ok(Self {
            admin_db: client.database("admin"),
            target,
        })
    }

    /// Hosts named in the connection string.
    pub fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, command: Document) -> Result<Document, AdminError> {
        let name = command.keys().next().cloned().unwrap_or_default();
        debug!(command = %name, node = %self.target, "running admin command");
        self.admin_db
            .run_command(command)
            .await
            .map_err(|err| classify(&self.target, err))
    }

    async fn raw_config(&self) -> Result<Document, AdminError> {
        let reply = self.run(doc! { "replSetGetConfig": 1 }).await?;
        reply
            .get_document("config")
            .cloned()
            .map_err(|err| AdminError::Serialization(format!("replSetGetConfig reply: {err}")))
    }
}

#[async_trait]
impl ReplicaSetAdmin for MongoAdmin {
    async fn initiate(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        let document = to_document(config)?;
        self.run(doc! { "replSetInitiate": document }).await?;
        Ok(())
    }

    async fn current_config(&self) -> Result<ReplicaSetConfig, AdminError> {
        let raw = self.raw_config().await?;
        bson::from_document(raw).map_err(|err| AdminError::Serialization(err.to_string()))
    }

    async fn reconfigure(&self, config: &ReplicaSetConfig) -> Result<(), AdminError> {
        let raw = self.raw_config().await?;
        let next = merge_reconfig(raw, config)?;
        self.run(doc! { "replSetReconfig": next }).await?;
        Ok(())
    }

    async fn role(&self) -> Result<NodeRole, AdminError> {
        let reply = self.run(doc! { "hello": 1 }).await?;
        let primary = reply.get_bool("isWritablePrimary").unwrap_or(false);
        let secondary = reply.get_bool("secondary").unwrap_or(false);
        Ok(match (primary, secondary) {
            (true, _) => NodeRole::Primary,
            (false, true) => NodeRole::Secondary,
            _ => NodeRole::Other,
        })
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, AdminError> {
    bson::to_document(value).map_err(|err| AdminError::Serialization(err.to_string()))
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

/// Builds the `replSetReconfig` document from the active raw configuration.
///
/// Members are emitted in the order of `config`. Each keeps every field the
/// server already had for its `_id`, with `host` and `priority` taken from
/// `config`. The version is bumped by one, the same way the shell helper
/// does; `term` is dropped because the primary assigns it.
fn merge_reconfig(mut raw: Document, config: &ReplicaSetConfig) -> Result<Document, AdminError> {
    let version = raw
        .get("version")
        .and_then(as_i64)
        .ok_or_else(|| AdminError::Serialization("active config has no version".to_string()))?;

    let existing: Vec<Document> = match raw.get_array("members") {
        Ok(members) => members
            .iter()
            .filter_map(|m| m.as_document().cloned())
            .collect(),
        Err(_) => Vec::new(),
    };

    let members = config
        .members
        .iter()
        .map(|member| merge_member(&existing, member))
        .collect::<Result<Vec<_>, _>>()?;

    raw.insert("_id", config.id.clone());
    raw.insert("members", members);
    let next_version = match raw.get("version") {
        Some(Bson::Int32(_)) if version < i64::from(i32::MAX) => Bson::Int32(version as i32 + 1),
        _ => Bson::Int64(version + 1),
    };
    raw.insert("version", next_version);
    raw.remove("term");
    Ok(raw)
}

fn merge_member(existing: &[Document], member: &MemberDescriptor) -> Result<Bson, AdminError> {
    let current = existing
        .iter()
        .find(|doc| doc.get("_id").and_then(as_i64) == Some(i64::from(member.id)));
    let merged = match current {
        Some(doc) => {
            let mut doc = doc.clone();
            doc.insert("host", member.host.clone());
            doc.insert("priority", member.priority);
            doc
        }
        None => to_document(member)?,
    };
    Ok(Bson::Document(merged))
}

/// Maps a driver failure onto the administrative error taxonomy.
fn classify(target: &str, err: DriverError) -> AdminError {
    let mapped = match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(match command.code {
            CODE_ALREADY_INITIALIZED => AdminError::AlreadyInitialized,
            CODE_NOT_YET_INITIALIZED => AdminError::NotInitialized,
            CODE_NOT_WRITABLE_PRIMARY
            | CODE_NOT_PRIMARY_NO_SECONDARY_OK
            | CODE_NOT_PRIMARY_OR_SECONDARY
            | CODE_INTERRUPTED_DUE_TO_REPL_STATE_CHANGE
            | CODE_PRIMARY_STEPPED_DOWN => AdminError::NotPrimary,
            CODE_INVALID_REPLICA_SET_CONFIG | CODE_NEW_REPLICA_SET_CONFIGURATION_INCOMPATIBLE => {
                AdminError::invalid(command.message.clone())
            }
            code => AdminError::Command {
                code,
                name: command.code_name.clone(),
                message: command.message.clone(),
            },
        }),
        ErrorKind::ServerSelection { message, .. }
        | ErrorKind::ConnectionPoolCleared { message, .. }
        | ErrorKind::DnsResolve { message, .. } => {
            Some(AdminError::unreachable(target, message.clone()))
        }
        ErrorKind::Io(io) => Some(AdminError::unreachable(target, io.to_string())),
        _ => None,
    };
    mapped.unwrap_or(AdminError::Driver(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_raw() -> Document {
        doc! {
            "_id": "todoapp-replica-set",
            "version": 1_i32,
            "term": 1_i64,
            "protocolVersion": 1_i64,
            "members": [
                { "_id": 0_i32, "host": "mongo-primary:27017", "priority": 1.0, "votes": 1_i32, "hidden": false },
                { "_id": 1_i32, "host": "mongo-secondary:27017", "priority": 1.0, "votes": 1_i32, "hidden": false }
            ],
            "settings": { "chainingAllowed": true }
        }
    }

    #[test]
    fn reads_server_config_documents() {
        let config: ReplicaSetConfig = bson::from_document(active_raw()).unwrap();
        assert_eq!(config.id, "todoapp-replica-set");
        assert_eq!(config.version, Some(1));
        assert_eq!(
            config.hosts(),
            vec!["mongo-primary:27017", "mongo-secondary:27017"]
        );
        assert_eq!(config.priorities(), vec![1.0, 1.0]);
    }

    #[test]
    fn initiate_document_omits_version() {
        let document = to_document(&ReplicaSetConfig::todoapp()).unwrap();
        assert!(!document.contains_key("version"));
        assert_eq!(document.get_str("_id").unwrap(), "todoapp-replica-set");
        let members = document.get_array("members").unwrap();
        let first = members[0].as_document().unwrap();
        assert_eq!(first.get("_id").and_then(as_i64), Some(0));
        assert_eq!(first.get_f64("priority").unwrap(), 1.0);
    }

    #[test]
    fn reconfig_bumps_version_and_keeps_unknown_fields() {
        let mut config = ReplicaSetConfig::todoapp();
        config.members[1].priority = 0.5;

        let next = merge_reconfig(active_raw(), &config).unwrap();
        assert_eq!(next.get_i32("version").unwrap(), 2);
        assert!(!next.contains_key("term"));
        assert!(next.contains_key("settings"));
        assert_eq!(next.get_i64("protocolVersion").unwrap(), 1);

        let members = next.get_array("members").unwrap();
        let secondary = members[1].as_document().unwrap();
        assert_eq!(secondary.get_f64("priority").unwrap(), 0.5);
        assert_eq!(secondary.get_i32("votes").unwrap(), 1);
        assert_eq!(secondary.get_str("host").unwrap(), "mongo-secondary:27017");
    }

    #[test]
    fn reconfig_follows_submitted_member_list() {
        let config = ReplicaSetConfig::new(
            "todoapp-replica-set",
            vec![
                MemberDescriptor::new(0, "mongo-primary:27017"),
                MemberDescriptor::new(2, "mongo-arbiter:27017").with_priority(0.0),
            ],
        );
        let next = merge_reconfig(active_raw(), &config).unwrap();
        let members = next.get_array("members").unwrap();
        assert_eq!(members.len(), 2);
        let added = members[1].as_document().unwrap();
        assert_eq!(added.get_str("host").unwrap(), "mongo-arbiter:27017");
        assert_eq!(added.get_f64("priority").unwrap(), 0.0);
    }

    #[test]
    fn reconfig_requires_a_version() {
        let mut raw = active_raw();
        raw.remove("version");
        let err = merge_reconfig(raw, &ReplicaSetConfig::todoapp()).unwrap_err();
        assert!(matches!(err, AdminError::Serialization(_)));
    }

    fn command_error(code: i32, name: &str) -> DriverError {
        let command: mongodb::error::CommandError = bson::from_document(doc! {
            "code": code,
            "codeName": name,
            "errmsg": format!("{name} from server"),
        })
        .unwrap();
        DriverError::from(ErrorKind::Command(command))
    }

    #[test]
    fn classifies_already_initialized() {
        let err = classify("mongo-primary:27017", command_error(23, "AlreadyInitialized"));
        assert!(err.is_already_initialized());
    }

    #[test]
    fn classifies_not_primary_family() {
        for (code, name) in [
            (10107, "NotWritablePrimary"),
            (13435, "NotPrimaryNoSecondaryOk"),
            (13436, "NotPrimaryOrSecondary"),
            (11602, "InterruptedDueToReplStateChange"),
            (189, "PrimarySteppedDown"),
        ] {
            let err = classify("mongo-secondary:27017", command_error(code, name));
            assert!(err.is_not_primary(), "{code} should map to NotPrimary, got {err:?}");
        }
    }

    #[test]
    fn classifies_not_yet_initialized() {
        let err = classify("mongo-primary:27017", command_error(94, "NotYetInitialized"));
        assert!(matches!(err, AdminError::NotInitialized));
    }

    #[test]
    fn classifies_rejected_configs() {
        for (code, name) in [
            (93, "InvalidReplicaSetConfig"),
            (103, "NewReplicaSetConfigurationIncompatible"),
        ] {
            match classify("mongo-primary:27017", command_error(code, name)) {
                AdminError::InvalidConfig { reason } => assert_eq!(reason, format!("{name} from server")),
                other => panic!("{code} should map to InvalidConfig, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_codes_keep_server_details() {
        match classify("mongo-primary:27017", command_error(13, "Unauthorized")) {
            AdminError::Command { code, name, message } => {
                assert_eq!(code, 13);
                assert_eq!(name, "Unauthorized");
                assert_eq!(message, "Unauthorized from server");
            }
            other => panic!("expected a command error, got {other:?}"),
        }
    }

    #[test]
    fn io_failures_are_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        match classify("mongo-primary:27017", DriverError::from(io)) {
            AdminError::Unreachable { host, reason } => {
                assert_eq!(host, "mongo-primary:27017");
                assert!(reason.contains("connection refused"), "{reason}");
            }
            other => panic!("expected unreachable, got {other:?}"),
        }
    }
}
