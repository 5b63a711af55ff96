use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "hookrelay",
    version = "0.1.0",
    about = "HookRelay \u{2014} reliable webhook ingest, retry, and replay relay"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hookrelay server (default)
    Start {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Number of delivery workers in the background pool. Defaults to
        /// the resolved `concurrent_deliveries` config value when unset.
        #[arg(long)]
        workers: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookrelay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Start {
        config: None,
        port: 8080,
        workers: None,
    });

    match cmd {
        Commands::Start { config, port, workers } => {
            // 1. Load config file + env overrides, then resolve defaults.
            let file_config =
                hookrelay_core::config::load_config_file(config.as_deref()).unwrap_or_default();
            let resolved = file_config.resolve();

            // 2. Resolve port: CLI flag > config file > default.
            let port = if port != 8080 { port } else { resolved.ingest_port };

            // 3. Resolve adapter URLs: env var wins, then config file.
            let redis_url = std::env::var("HOOKRELAY_REDIS_URL")
                .ok()
                .or_else(|| resolved.redis_url.clone());
            let postgres_url = std::env::var("HOOKRELAY_POSTGRES_URL")
                .ok()
                .or_else(|| resolved.postgres_url.clone());

            // 4. Build the delivery queue.
            let queue: Arc<dyn hookrelay_core::DeliveryQueue> = if let Some(ref url) = redis_url {
                let client = redis::Client::open(url.as_str())?;
                let conn = client.get_multiplexed_async_connection().await?;
                Arc::new(hookrelay_redis::RedisDeliveryQueue::new(conn, None))
            } else {
                tracing::warn!("no HOOKRELAY_REDIS_URL configured \u{2014} using in-memory queue");
                Arc::new(hookrelay_core::MemoryDeliveryQueue::new())
            };

            // 5. Build the endpoint/delivery/dead-letter stores.
            let (endpoints, deliveries, dead_letters): (
                Arc<dyn hookrelay_core::EndpointStore>,
                Arc<dyn hookrelay_core::DeliveryStore>,
                Arc<dyn hookrelay_core::DeadLetterStore>,
            ) = if let Some(ref url) = postgres_url {
                let pool = sqlx::PgPool::connect(url).await?;
                hookrelay_postgres::migrate(&pool, None).await?;
                (
                    Arc::new(hookrelay_postgres::PostgresEndpointStore::new(pool.clone(), None)),
                    Arc::new(hookrelay_postgres::PostgresDeliveryStore::new(pool.clone(), None)),
                    Arc::new(hookrelay_postgres::PostgresDeadLetterStore::new(pool, None)),
                )
            } else {
                tracing::warn!(
                    "no HOOKRELAY_POSTGRES_URL configured \u{2014} using in-memory stores"
                );
                (
                    Arc::new(hookrelay_core::MemoryEndpointStore::new()),
                    Arc::new(hookrelay_core::MemoryDeliveryStore::new()),
                    Arc::new(hookrelay_core::MemoryDeadLetterStore::new()),
                )
            };

            // 6. Build the engine.
            let engine = Arc::new(hookrelay_core::RelayEngine::new(hookrelay_core::RelayEngineOptions {
                endpoints,
                deliveries,
                queue,
                dead_letters,
                config: resolved.clone(),
            }));

            // 7. Spawn the background delivery worker pool, sized from the
            // resolved config unless the CLI flag overrides it.
            let visibility_timeout_ms = resolved.retry_base_sec.max(1) * 1000;
            let workers = workers.unwrap_or(resolved.concurrent_deliveries);
            let _workers = hookrelay_server::worker::spawn_worker_pool(
                Arc::clone(&engine),
                workers,
                visibility_timeout_ms,
            );

            // 8. Spawn the retention sweep (archives expired deliveries,
            // purges expired dead letters) once a day.
            let _cleanup = hookrelay_server::worker::spawn_cleanup_sweep(
                Arc::clone(&engine),
                std::time::Duration::from_secs(24 * 60 * 60),
            );

            // 9. Resolve the operator auth mode.
            let auth_mode = hookrelay_server::auth_mode_from_config(&resolved);

            // 10. Create and serve the app.
            let app = hookrelay_server::create_app(engine, auth_mode);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            tracing::info!(port, "hookrelay server started");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
