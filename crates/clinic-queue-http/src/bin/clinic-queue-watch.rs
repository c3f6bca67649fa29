//! Poll a clinic queue and print its board.
//!
//! ```text
//! clinic-queue-watch --base-url http://localhost:8000/ --stage assessment
//! clinic-queue-watch --config clinic-queue.toml --once
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use clinic_queue_core::poller::Completion;
use clinic_queue_core::{ClientConfig, PriorityClass, QueueClient, QueueStage};
use clinic_queue_http::HttpQueueService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "clinic-queue-watch", about = "Watch a clinic queue board")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service root; overrides the config file
    #[arg(long)]
    base_url: Option<String>,

    /// registration, assessment or treatment
    #[arg(long)]
    stage: Option<QueueStage>,

    /// Seconds between polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Fetch once and exit
    #[arg(long)]
    once: bool,

    /// Stop after this many fetches
    #[arg(long)]
    max_polls: Option<u64>,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match (&args.config, &args.base_url) {
        (Some(path), _) => ClientConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        (None, Some(base_url)) => ClientConfig::new(base_url.clone()),
        (None, None) => bail!("either --config or --base-url is required"),
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(stage) = args.stage {
        config.stage = stage;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval_secs = secs;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn render(client: &QueueClient<HttpQueueService>) {
    let view = client.view();
    let lane = |class| view.labels(class).join("  ");

    let status = match (&view.error, view.last_updated) {
        (Some(error), Some(updated)) => format!("showing board from {} ({})", updated.format("%H:%M:%S"), error),
        (Some(error), None) => format!("no board yet ({})", error),
        (None, Some(updated)) => format!("updated {}", updated.format("%H:%M:%S")),
        (None, None) => "waiting".to_string(),
    };

    println!(
        "[{}] priority: {} | regular: {} | {}",
        client.controller().queue(),
        lane(PriorityClass::Priority),
        lane(PriorityClass::Regular),
        status
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    if config.resolve_token().is_none() {
        warn!(token_env = %config.token_env, "no bearer token configured, requests are unauthenticated");
    }

    let service = HttpQueueService::from_config(&config).context("building HTTP client")?;
    let mut client = QueueClient::new(service, config.controller());
    info!(queue = %config.stage, base_url = %config.base_url, "watching queue");

    let mut completion = client.mount();
    let mut polls = 1u64;
    loop {
        if completion != Completion::Stale {
            render(&client);
        }
        if args.once || args.max_polls.is_some_and(|max| polls >= max) {
            break;
        }

        match client.controller().next_poll_delay() {
            Some(delay) => std::thread::sleep(delay),
            None => bail!(
                "giving up after {} consecutive failures",
                client.view().consecutive_failures
            ),
        }

        completion = client.refresh();
        polls += 1;
    }

    client.unmount();
    Ok(())
}
