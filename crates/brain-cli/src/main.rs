//! `brain` — operator CLI for the Brain orchestration core: submit test
//! turns directly against a tenant's pipeline, inspect and resolve
//! Dead-Letter Store entries, reload a tenant's registries, and run the
//! Turn API server.

mod composition;

use brain_cognitive::{TurnInput, UserContext};
use brain_core::{ActionRegistryStore, DlqStore, QueueStore, SchemaRegistryStore};
use brain_types::{BrandId, DlqId, InstanceId};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "brain", about = "Operator CLI for the Brain orchestration core")]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, default_value = "brain.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Turn API server for a single tenant.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
        #[arg(long)]
        brand: String,
        #[arg(long)]
        instance: String,
        #[arg(long, env = "BRAIN_JWT_SECRET")]
        jwt_secret: String,
    },
    /// Submit a turn to a tenant's pipeline from a JSON file and print the result.
    Turn {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        instance: String,
        /// Path to a JSON-encoded `TurnInput`.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "standard")]
        tier: String,
        #[arg(long, default_value_t = true)]
        authenticated: bool,
    },
    /// Dead-Letter Store management.
    Dlq {
        #[command(subcommand)]
        action: DlqCommand,
    },
    /// Registry reload.
    Registry {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        instance: String,
    },
}

#[derive(Subcommand)]
enum DlqCommand {
    /// List unresolved entries.
    List,
    /// Mark an entry resolved.
    Resolve {
        id: String,
        #[arg(long)]
        notes: String,
        /// Requeue a fresh attempt (retry_count reset to 0) before
        /// marking this entry resolved (§4.9).
        #[arg(long)]
        retry: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, brand, instance, jwt_secret } => {
            let db = composition::open_database(&cli.db).await?;
            let brand_id = BrandId::from(brand.as_str());
            let instance_id = InstanceId::from(instance.as_str());
            let runtime = Arc::new(composition::build_pipeline(&db, brand_id.clone(), instance_id.clone()));

            tokio::spawn(composition::run_sweeps(runtime.clone(), std::time::Duration::from_secs(30)));

            let mut pipelines = HashMap::new();
            pipelines.insert((brand_id, instance_id), runtime.pipeline.clone());

            let dlq: Arc<dyn DlqStore> = Arc::new(brain_infra::SqliteDlqStore::new(db.pool().clone()));
            let queue: Arc<dyn QueueStore> = Arc::new(brain_infra::SqliteQueueStore::new(db.pool().clone()));

            let state = brain_api::AppState {
                pipelines: Arc::new(pipelines),
                dlq,
                queue,
                auth: Arc::new(brain_api::AuthService::new(jwt_secret.as_bytes())),
                limiter: brain_api::build_limiter(&brain_api::RateLimitConfig::default()),
            };

            let addr: SocketAddr = addr.parse()?;
            tracing::info!(%addr, "starting brain-api");
            brain_api::serve(addr, state).await
        }
        Commands::Turn { brand, instance, input, tier, authenticated } => {
            let db = composition::open_database(&cli.db).await?;
            let runtime = composition::build_pipeline(&db, BrandId::from(brand.as_str()), InstanceId::from(instance.as_str()));

            let raw = std::fs::read_to_string(&input)?;
            let turn_input: TurnInput = serde_json::from_str(&raw)?;
            let user = UserContext { tier, authenticated };

            let output = runtime.pipeline.process_turn(turn_input, &user, &HashMap::new()).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Commands::Dlq { action } => {
            let db = composition::open_database(&cli.db).await?;
            let store = brain_infra::SqliteDlqStore::new(db.pool().clone());
            match action {
                DlqCommand::List => {
                    for entry in store.list_unresolved().await? {
                        println!(
                            "{}  action={}  moved_at={}  manual_intervention={}",
                            entry.dlq_id, entry.action_id, entry.moved_at, entry.requires_manual_intervention
                        );
                    }
                }
                DlqCommand::Resolve { id, notes, retry } => {
                    let dlq_id = DlqId::from_str(&id)?;
                    let mut entry = store.get(&dlq_id).await?.ok_or_else(|| anyhow::anyhow!("no such DLQ entry: {id}"))?;

                    if retry {
                        let queue: Arc<dyn QueueStore> = Arc::new(brain_infra::SqliteQueueStore::new(db.pool().clone()));
                        if let Some(original) = queue.get(&entry.original_queue_id).await? {
                            let retry_entry = entry.build_retry_entry(&original);
                            queue.insert(&retry_entry).await?;
                            println!("requeued {} as {}", entry.original_queue_id, retry_entry.queue_id);
                        } else {
                            println!("original queue entry {} not found, nothing requeued", entry.original_queue_id);
                        }
                    }

                    entry.resolve(notes);
                    store.update(&entry).await?;
                    println!("resolved {dlq_id}");
                }
            }
            Ok(())
        }
        Commands::Registry { brand, instance } => {
            let db = composition::open_database(&cli.db).await?;
            let brand_id = BrandId::from(brand.as_str());
            let instance_id = InstanceId::from(instance.as_str());

            let actions = brain_infra::SqliteActionRegistryStore::new(db.pool().clone());
            actions.reload(&instance_id).await?;
            let schemas = brain_infra::SqliteSchemaRegistryStore::new(db.pool().clone());
            schemas.reload(&brand_id).await?;

            println!("reloaded registries for {brand_id}/{instance_id}");
            Ok(())
        }
    }
}
