//! Augur CLI - Command line interface for the augur model-serving engine

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warp::Filter;

use augur_core::ModelRegistry;
use augur_runtime::{consume, InMemoryQueue, InMemoryStore, JobQueue, ResultStore, Worker};
use augur_serving::{api, ServeContext, SharedContext};

use augur_cli::check_artifacts;
use augur_cli::config::Config;

#[derive(Parser)]
#[command(name = "augur")]
#[command(author = "Augur Contributors")]
#[command(version = "0.2.0")]
#[command(about = "Augur - model serving engine", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "AUGUR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP serving front-end
    Serve {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Directory of model artifacts (*.json)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// Run an in-process worker pool instead of connecting to NATS and Redis
        #[arg(long)]
        standalone: bool,
    },

    /// Start a prediction worker that drains the job queue
    Worker {
        /// Directory of model artifacts (*.json)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// Parallel consumer tasks
        #[arg(long)]
        concurrency: Option<usize>,

        /// Requeues allowed per job before a transient failure turns terminal
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Validate model artifacts without serving them
    Check {
        /// Directory of model artifacts (*.json)
        model_dir: PathBuf,
    },

    /// Generate example configuration file
    ConfigGen {
        /// Output format (yaml, toml)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load(path).map_err(|e| anyhow::anyhow!("{}", e))?,
        None => Config::default(),
    };

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            model_dir,
            standalone,
        } => {
            // CLI flags override the config file.
            let mut cfg = config;
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(bind) = bind {
                cfg.server.host = bind;
            }
            if let Some(dir) = model_dir {
                cfg.models.model_dir = dir;
            }

            run_serve(cfg, standalone).await?;
        }

        Commands::Worker {
            model_dir,
            concurrency,
            max_retries,
        } => {
            let mut cfg = config;
            if let Some(dir) = model_dir {
                cfg.models.model_dir = dir;
            }
            if let Some(n) = concurrency {
                cfg.worker.concurrency = n;
            }
            if let Some(n) = max_retries {
                cfg.worker.max_retries = n;
            }

            run_worker(cfg).await?;
        }

        Commands::Check { model_dir } => {
            run_check(&model_dir)?;
        }

        Commands::ConfigGen { format, output } => {
            let content = match format.to_lowercase().as_str() {
                "yaml" | "yml" => Config::example_yaml(),
                "toml" => Config::example_toml(),
                _ => anyhow::bail!("Unsupported format: {}. Use 'yaml' or 'toml'", format),
            };

            if let Some(path) = output {
                std::fs::write(&path, &content)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", content);
            }
        }
    }

    Ok(())
}

// =============================================================================
// Serve Mode - HTTP front-end
// =============================================================================

async fn run_serve(cfg: Config, standalone: bool) -> Result<()> {
    let registry = Arc::new(ModelRegistry::build(&cfg.models.model_dir));

    println!("Augur Serving");
    println!("=============");
    println!("REST API:  http://{}:{}/", cfg.server.host, cfg.server.port);
    println!(
        "Metrics:   http://{}:{}/metrics",
        cfg.server.host, cfg.server.port
    );
    println!(
        "Models:    {} loaded from {}",
        registry.len(),
        cfg.models.model_dir.display()
    );
    if standalone {
        println!(
            "Mode:      standalone ({} in-process workers)",
            cfg.worker.concurrency.max(1)
        );
    } else {
        println!("Mode:      distributed");
        println!("Queue:     {}", cfg.queue.url);
        println!("Results:   {}", cfg.results.url);
    }
    println!();

    if standalone {
        serve_standalone(cfg, registry).await
    } else {
        serve_distributed(cfg, registry).await
    }
}

/// Everything in one process: in-memory queue and store plus a worker pool
/// on the serving runtime. Jobs do not survive a restart in this mode.
async fn serve_standalone(cfg: Config, registry: Arc<ModelRegistry>) -> Result<()> {
    let queue = Arc::new(InMemoryQueue::new());
    let store = Arc::new(InMemoryStore::new());

    let ctx = Arc::new(
        ServeContext::new(
            registry.clone(),
            queue.clone() as Arc<dyn JobQueue>,
            store as Arc<dyn ResultStore>,
        )
        .with_ping_timeout(Duration::from_secs(cfg.queue.request_timeout_secs)),
    );

    // The embedded workers report into the serving metrics registry so
    // /metrics shows job counters alongside request counters.
    let worker = Arc::new(
        Worker::new(
            registry,
            queue.clone() as Arc<dyn JobQueue>,
            ctx.store.clone(),
        )
        .with_max_retries(cfg.worker.max_retries)
        .with_metrics(ctx.metrics.clone()),
    );
    for _ in 0..cfg.worker.concurrency.max(1) {
        tokio::spawn(consume(worker.clone(), queue.consumer()));
    }

    serve_http(&cfg, ctx).await
}

#[cfg(all(feature = "nats-transport", feature = "redis-store"))]
async fn serve_distributed(cfg: Config, registry: Arc<ModelRegistry>) -> Result<()> {
    use augur_runtime::{NatsQueue, RedisStore};

    let queue = NatsQueue::connect(&cfg.queue.url, &cfg.queue.subject_prefix)
        .await
        .map_err(|e| anyhow::anyhow!("Queue connection failed: {}", e))?;
    let store = RedisStore::connect(&cfg.results.url, &cfg.results.key_prefix, cfg.results.ttl_secs)
        .await
        .map_err(|e| anyhow::anyhow!("Result store connection failed: {}", e))?;

    let ctx = Arc::new(
        ServeContext::new(
            registry,
            Arc::new(queue) as Arc<dyn JobQueue>,
            Arc::new(store) as Arc<dyn ResultStore>,
        )
        .with_ping_timeout(Duration::from_secs(cfg.queue.request_timeout_secs)),
    );

    serve_http(&cfg, ctx).await
}

#[cfg(not(all(feature = "nats-transport", feature = "redis-store")))]
async fn serve_distributed(_cfg: Config, _registry: Arc<ModelRegistry>) -> Result<()> {
    anyhow::bail!(
        "distributed mode requires the 'nats-transport' and 'redis-store' features; \
         rebuild with default features or run with --standalone"
    )
}

async fn serve_http(cfg: &Config, ctx: SharedContext) -> Result<()> {
    let routes = api::routes(ctx).recover(api::handle_rejection);

    let bind_addr: std::net::IpAddr = cfg
        .server
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", cfg.server.host, e))?;

    info!("serving on {}:{}", cfg.server.host, cfg.server.port);
    warp::serve(routes).run((bind_addr, cfg.server.port)).await;
    Ok(())
}

// =============================================================================
// Worker Mode - queue consumer pool
// =============================================================================

#[cfg(all(feature = "nats-transport", feature = "redis-store"))]
async fn run_worker(cfg: Config) -> Result<()> {
    use augur_runtime::{run_ping_responder, NatsQueue, RedisStore};

    let registry = Arc::new(ModelRegistry::build(&cfg.models.model_dir));
    let concurrency = cfg.worker.concurrency.max(1);

    println!("Augur Worker");
    println!("============");
    println!(
        "Models:      {} loaded from {}",
        registry.len(),
        cfg.models.model_dir.display()
    );
    println!("Queue:       {}", cfg.queue.url);
    println!("Results:     {}", cfg.results.url);
    println!("Concurrency: {}", concurrency);
    println!("Max retries: {}", cfg.worker.max_retries);
    println!();

    let queue = Arc::new(
        NatsQueue::connect(&cfg.queue.url, &cfg.queue.subject_prefix)
            .await
            .map_err(|e| anyhow::anyhow!("Queue connection failed: {}", e))?,
    );
    let store = RedisStore::connect(&cfg.results.url, &cfg.results.key_prefix, cfg.results.ttl_secs)
        .await
        .map_err(|e| anyhow::anyhow!("Result store connection failed: {}", e))?;

    // Answers the serving side's readiness pings for as long as we run.
    tokio::spawn(run_ping_responder(
        queue.client().clone(),
        queue.prefix().to_string(),
    ));

    let worker = Arc::new(
        Worker::new(
            registry,
            queue.clone() as Arc<dyn JobQueue>,
            Arc::new(store) as Arc<dyn ResultStore>,
        )
        .with_max_retries(cfg.worker.max_retries),
    );

    let mut tasks = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let consumer = queue
            .consumer()
            .await
            .map_err(|e| anyhow::anyhow!("Queue subscribe failed: {}", e))?;
        tasks.push(tokio::spawn(consume(worker.clone(), consumer)));
    }
    info!("worker pool running with {} consumers", concurrency);

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

#[cfg(not(all(feature = "nats-transport", feature = "redis-store")))]
async fn run_worker(_cfg: Config) -> Result<()> {
    anyhow::bail!("worker mode requires the 'nats-transport' and 'redis-store' features")
}

// =============================================================================
// Check Mode - artifact validation
// =============================================================================

fn run_check(model_dir: &Path) -> Result<()> {
    println!("Checking artifacts in {}", model_dir.display());
    let (valid, broken) = check_artifacts(model_dir)?;
    for line in &valid {
        println!("  OK    {}", line);
    }
    for line in &broken {
        println!("  FAIL  {}", line);
    }
    println!();
    println!("{} valid, {} broken", valid.len(), broken.len());
    if !broken.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
