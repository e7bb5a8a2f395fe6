use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use thrash_core::{
    Config, Dispatcher, Fetcher, HttpFetcher, LoadPlan, MockFetcher, RunReport, MAX_CONCURRENCY,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "thrash")]
#[command(about = "Concurrent HTTP load generator - hammers one URL or a weighted set of endpoints")]
struct Args {
    /// The total number of requests to make
    #[arg(short = 'n', default_value_t = 0)]
    requests: u64,

    /// The number of concurrent requests to execute
    #[arg(
        short = 'c',
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CONCURRENCY as u64)
    )]
    concurrency: u64,

    /// Path to the endpoint configuration (YAML or TOML)
    #[arg(long, default_value = "./config.yml")]
    config: PathBuf,

    /// Fetch mode: http or mock
    #[arg(long, default_value = "http")]
    mode: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Seed for weighted endpoint selection
    #[arg(long)]
    seed: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Single URL to hit instead of the configured endpoints
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let plan = match args.url.as_deref() {
        Some(url) => {
            info!("Single endpoint mode: {}", url);
            LoadPlan::single(url)?
        }
        None => {
            let config = Config::from_file(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(
                "Weighted mode: {} endpoint(s) under {}",
                config.endpoints.len(),
                config.root
            );
            LoadPlan::from_config(&config).context("Invalid endpoint frequencies")?
        }
    };

    let fetcher: Arc<dyn Fetcher> = match args.mode.as_str() {
        "mock" => Arc::new(MockFetcher::new(5)), // 5ms simulated latency
        "http" => Arc::new(
            HttpFetcher::new(args.timeout_ms).context("Failed to create HTTP client")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    let concurrency = usize::try_from(args.concurrency).context("Concurrency too large")?;
    let mut dispatcher = Dispatcher::new(fetcher, concurrency);
    if let Some(seed) = args.seed {
        dispatcher = dispatcher.with_seed(seed);
    }

    let report = dispatcher.run(plan, args.requests).await?;
    print_report(&report, args.json)?;

    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!();
        print!("{report}");
        println!();
    }
    Ok(())
}
