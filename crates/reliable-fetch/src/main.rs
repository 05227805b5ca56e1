use clap::Parser;
use reliable_fetch::{
    bulk_requeue, FetchConfig, Fetcher, JobTypeRegistry, ListStore, RedisStore, Strategy,
    WorkerContext,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rf-worker")]
#[command(about = "Reliable fetch demo worker", long_about = None)]
struct Args {
    /// Redis URL
    #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
    redis: String,

    /// Queues to service, in priority order
    #[arg(short, long, default_values_t = vec!["default".to_string()])]
    queues: Vec<String>,

    /// Strict queue priority instead of round-robin rotation
    #[arg(long)]
    strict: bool,

    /// Fetch strategy: "reliable" or "semi-reliable"
    #[arg(long, default_value = "reliable")]
    strategy: String,

    /// Path to a YAML configuration file (CLI flags win)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = if let Some(path) = &args.config {
        FetchConfig::from_file(path)?
    } else {
        FetchConfig::default()
    };
    config.queues = args.queues;
    config.strict = args.strict;
    config.strategy = match args.strategy.as_str() {
        "reliable" => Strategy::Reliable,
        "semi-reliable" => Strategy::SemiReliable,
        other => anyhow::bail!("unknown strategy: {}", other),
    };

    let store: Arc<dyn ListStore> = Arc::new(RedisStore::connect(&args.redis).await?);
    let ctx = WorkerContext::new(store, config)?;
    let fetcher = Fetcher::new(ctx.clone());
    let registry = JobTypeRegistry::new(ctx.config().max_interruptions);

    tracing::info!(identity = %ctx.identity(), "worker started");

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("received shutdown signal");
                break;
            }
            result = fetcher.retrieve_work() => {
                match result {
                    Ok(Some(unit)) => {
                        // Demo worker: log the job and acknowledge it. A
                        // real worker would dispatch to a handler here and
                        // pass unfinished units to bulk_requeue below.
                        match unit.job() {
                            Ok(job) => tracing::info!(
                                class = %job.class,
                                jid = %job.jid_display(),
                                queue = unit.queue_name(),
                                "processing job"
                            ),
                            Err(e) => tracing::warn!(error = %e, "fetched unparseable job"),
                        }
                        unit.acknowledge().await?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "fetch failed; retrying");
                    }
                }
            }
        }
    }

    // Nothing outstanding in this demo loop, but the shutdown path is the
    // same one a real worker uses with its in-flight units.
    bulk_requeue(Vec::new(), &registry, &ctx).await;
    ctx.stop_heartbeat().await;
    tracing::info!("worker stopped");

    Ok(())
}
