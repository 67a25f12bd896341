use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueHint};

use crate::config::{MemberDescriptor, ReplicaSetConfig};
use crate::mongo::DEFAULT_URI;
use crate::policy::PriorityPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bootstrap a MongoDB replica set", long_about = None)]
pub struct Cli {
    /// Connection string of the node to administer.
    #[arg(long, global = true, default_value = DEFAULT_URI, value_hint = ValueHint::Url)]
    pub uri: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initiate the replica set, then apply the priority policy.
    Init(InitArgs),
    /// Apply the priority policy to an already initiated replica set.
    Reprioritize(PolicyArgs),
    /// Print the active replica set configuration as JSON.
    Show,
    /// Print the configuration `init` would submit, without connecting.
    Print(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Only initiate; leave member priorities as submitted.
    #[arg(long)]
    pub skip_reprioritize: bool,

    /// Print the configuration as JSON before submitting it.
    #[arg(long)]
    pub print: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// JSON replica set document to use instead of the built-in one.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Override the replica set id.
    #[arg(long)]
    pub set_name: Option<String>,

    /// Member list as id=host entries, in priority order (replaces the members).
    #[arg(long, value_delimiter = ',', value_parser = parse_member)]
    pub member: Vec<MemberDescriptor>,
}

impl ConfigArgs {
    /// Built-in config, replaced by `--config`, then patched by the
    /// individual overrides. The result is validated.
    pub fn resolve(&self) -> Result<ReplicaSetConfig> {
        let mut config = match &self.config {
            Some(path) => ReplicaSetConfig::load(path)?,
            None => ReplicaSetConfig::todoapp(),
        };
        if let Some(name) = &self.set_name {
            config.id = name.clone();
        }
        if !self.member.is_empty() {
            config.members = self.member.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Comma-separated priorities assigned to members by position.
    #[arg(long, default_value = "1,0.5")]
    pub priorities: PriorityPolicy,
}

/// Parses an `id=host` member entry.
fn parse_member(entry: &str) -> Result<MemberDescriptor, String> {
    let Some((id, host)) = entry.split_once('=') else {
        return Err(format!("invalid member entry '{entry}', expected id=host"));
    };
    let id: u8 = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid member id in '{entry}'"))?;
    let host = host.trim();
    if host.is_empty() {
        return Err(format!("missing host in '{entry}'"));
    }
    Ok(MemberDescriptor::new(id, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("replica-set-init").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn init_defaults_to_todoapp_config() {
        let cli = parse(&["init"]);
        assert_eq!(cli.uri, DEFAULT_URI);
        let Command::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert!(!args.skip_reprioritize);
        assert_eq!(args.policy.priorities, PriorityPolicy::default());
        assert_eq!(args.config.resolve().unwrap(), ReplicaSetConfig::todoapp());
    }

    #[test]
    fn member_overrides_replace_the_list() {
        let cli = parse(&[
            "print",
            "--set-name",
            "rs-test",
            "--member",
            "0=mongo-primary:27017,1=mongo-secondary:27018",
        ]);
        let Command::Print(args) = cli.command else {
            panic!("expected print");
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.id, "rs-test");
        assert_eq!(
            config.hosts(),
            vec!["mongo-primary:27017", "mongo-secondary:27018"]
        );
    }

    #[test]
    fn malformed_member_is_rejected() {
        assert!(parse_member("mongo-primary:27017").is_err());
        assert!(parse_member("x=mongo-primary:27017").is_err());
        assert!(parse_member("0=").is_err());
        assert_eq!(
            parse_member(" 1 = mongo-secondary:27017 ").unwrap(),
            MemberDescriptor::new(1, "mongo-secondary:27017")
        );
        assert!(Cli::try_parse_from(["replica-set-init", "print", "--member", "bogus"]).is_err());
    }

    #[test]
    fn duplicate_member_ids_fail_resolution() {
        let cli = parse(&["print", "--member", "0=a:27017", "--member", "0=b:27017"]);
        let Command::Print(args) = cli.command else {
            panic!("expected print");
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn global_uri_after_subcommand() {
        let cli = parse(&[
            "reprioritize",
            "--uri",
            "mongodb://mongo-secondary:27017/?directConnection=true",
            "--priorities",
            "1,0.25",
        ]);
        assert_eq!(
            cli.uri,
            "mongodb://mongo-secondary:27017/?directConnection=true"
        );
        let Command::Reprioritize(args) = cli.command else {
            panic!("expected reprioritize");
        };
        assert_eq!(args.priorities.weights(), &[1.0, 0.25]);
    }
}
