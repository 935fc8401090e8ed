use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use indexer_core::task_queue::{QueueName, TaskQueue};
use indexer_core::traits::ThrottleStore;
use indexer_core::{Item, OrchestraConfig, Task};
use indexer_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "indexer", version, about = "Torrent indexer task store tools")]
struct Cli {
    /// Site being indexed. Scopes queue and throttle rows.
    #[arg(long, global = true, env = "INDEXER_MODE", default_value = "default")]
    mode: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate,

    /// Queue a task for the next tick
    Enqueue {
        /// Listing page for a MAIN task (defaults to the first page)
        #[arg(short, long, conflicts_with = "uri")]
        page: Option<u32>,

        /// Queue a SUB task for this item instead of a MAIN task
        #[arg(short, long)]
        uri: Option<String>,
    },

    /// Show queue lengths, the last full crawl and the effective config
    Status {
        /// Number of head entries to list per queue
        #[arg(short, long, default_value_t = 5)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("indexer=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Migrate => {
            db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!("Migrations applied");
        }
        Commands::Enqueue { page, uri } => {
            let task = match (page, uri) {
                (_, Some(uri)) => Task::sub(Item::new(uri)),
                (Some(page), None) => {
                    anyhow::ensure!(page >= 1, "--page is 1-based");
                    Task::main_page(page)
                }
                (None, None) => Task::main(),
            };
            cmd_enqueue(&db, &cli.mode, &task).await?;
        }
        Commands::Status { limit } => {
            cmd_status(&db, &cli.mode, limit).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to connect to database")
}

async fn cmd_enqueue(db: &Database, mode: &str, task: &Task) -> Result<()> {
    let queue = db.task_queue(mode);
    queue
        .offer_task(task)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(task_id = %task.id, key = %task.key(), mode, "Task queued");
    println!("{}", task.id);
    Ok(())
}

async fn cmd_status(db: &Database, mode: &str, limit: u32) -> Result<()> {
    let config = OrchestraConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let queue = db.task_queue(mode);
    let throttle = db.throttle_store(mode);

    println!("Indexer mode: {mode}\n");

    for name in [QueueName::Task, QueueName::Failed] {
        let len = queue.len(name).await.map_err(|e| anyhow::anyhow!(e))?;
        println!("  {name}: {len} queued");

        let head = queue
            .peek(name, limit)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        for task in head {
            let queued_at = task
                .update_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default();
            println!(
                "    {} {} (retries: {}, queued: {})",
                task.id,
                task.key(),
                task.retry_count,
                queued_at
            );
        }
    }

    let last_main = throttle
        .get_last_main_task_time()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    match last_main {
        Some(at) => {
            let age = Utc::now().signed_duration_since(at);
            let overdue = age.to_std().is_ok_and(|age| age > config.min_check_interval);
            println!(
                "\nLast full crawl: {} ({}s ago{})",
                at.format("%Y-%m-%d %H:%M:%S UTC"),
                age.num_seconds(),
                if overdue { ", overdue" } else { "" }
            );
        }
        None => println!("\nLast full crawl: never"),
    }

    println!(
        "\nConfig: min_interval={}ms min_check_interval={}ms max_retry_count={} max_page_no={}",
        config.min_interval.as_millis(),
        config.min_check_interval.as_millis(),
        config.max_retry_count,
        config.max_page_no
    );

    Ok(())
}
