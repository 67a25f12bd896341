use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use replica_set_init::{
    cli::{Cli, Command},
    mongo::MongoAdmin,
    ReplicaSetAdmin, TopologyInitializer,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Print(args) => {
            let config = args.resolve()?;
            println!("{}", config.to_json_pretty()?);
        }
        Command::Init(args) => {
            let config = args.config.resolve()?;
            if args.print {
                println!("{}", config.to_json_pretty()?);
            }

            let admin = connect(&cli.uri).await?;
            let report = TopologyInitializer::new(admin)
                .with_policy(args.policy.priorities)
                .skip_reprioritize(args.skip_reprioritize)
                .run(&config)
                .await?;
            match report.reprioritized {
                Some(applied) => info!(
                    set = %applied.id,
                    priorities = ?applied.priorities(),
                    "bootstrap complete"
                ),
                None => info!(set = %report.initiated.id, "bootstrap complete"),
            }
        }
        Command::Reprioritize(args) => {
            let admin = connect(&cli.uri).await?;
            let applied = TopologyInitializer::new(admin)
                .with_policy(args.priorities)
                .reprioritize()
                .await?;
            if applied.is_none() {
                info!("nothing to change");
            }
        }
        Command::Show => {
            let admin = connect(&cli.uri).await?;
            let role = admin.role().await?;
            info!(node = %admin.target(), %role, "connected");
            let config = admin.current_config().await?;
            println!("{}", config.to_json_pretty()?);
        }
    }

    Ok(())
}

async fn connect(uri: &str) -> Result<MongoAdmin> {
    MongoAdmin::connect(uri)
        .await
        .with_context(|| format!("failed to set up a client for {uri}"))
}
