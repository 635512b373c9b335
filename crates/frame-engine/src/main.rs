use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use config_model::ActiveConfig;
use humantime::{format_rfc3339, parse_rfc3339};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use frame_engine::clock::SystemClock;
use frame_engine::config::Configuration;
use frame_engine::platform::display::Display;
use frame_engine::platform::signals::{self, ControlFlags};
use frame_engine::tasks::controller::Controller;
use frame_engine::tasks::indexer::MediaIndexer;
use frame_engine::tasks::playlist::{BoostSettings, simulate_playlist};

#[derive(Debug, Parser)]
#[command(
    name = "frame-engine",
    version,
    about = "Full-screen photo and video playback for a picture frame"
)]
struct Args {
    /// Path to the engine's YAML config
    #[arg(long, value_name = "FILE", default_value = "/etc/frame-engine/config.yaml")]
    config: PathBuf,
    /// Freeze recency weighting at this RFC 3339 instant (useful for tests)
    #[arg(long = "playlist-now", value_name = "RFC3339")]
    playlist_now: Option<String>,
    /// Print the weighted playlist order without opening a window
    #[arg(long = "playlist-dry-run", value_name = "ITERATIONS")]
    playlist_dry_run: Option<usize>,
    /// Deterministic RNG seed for playlist shuffling (applies to dry-run and live modes)
    #[arg(long = "playlist-seed", value_name = "SEED")]
    playlist_seed: Option<u64>,
    /// Log the engine's own decisions at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        playlist_now,
        playlist_dry_run,
        playlist_seed,
        verbose,
    } = Args::parse();

    // RUST_LOG wins; otherwise info, or debug for our own target with -v.
    let default_filter = if verbose {
        "info,frame_engine=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .compact()
        .init();

    let now_override = match playlist_now {
        Some(ts) => Some(parse_rfc3339(&ts).context("failed to parse --playlist-now")?),
        None => None,
    };

    let cfg = Configuration::load_or_default(&config)?
        .validated()
        .context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    if let Some(iterations) = playlist_dry_run {
        return run_playlist_dry_run(&cfg, iterations, now_override, playlist_seed);
    }

    let cancel = CancellationToken::new();
    let flags = ControlFlags::new();
    signals::spawn_listeners(flags.clone(), cancel.clone());

    let display = Display::new()?;

    // Closing the window on cancellation unblocks the main thread.
    {
        let cancel = cancel.clone();
        let sink = display.sink();
        tokio::spawn(async move {
            cancel.cancelled().await;
            sink.request_shutdown();
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn_blocking({
        let sink = display.sink();
        let cancel = cancel.clone();
        let flags = flags.clone();
        let cfg = cfg.clone();
        move || {
            if !sink.wait_ready(Duration::from_secs(10)) {
                tracing::warn!("display size unknown; rendering at the fallback size");
            }
            let mut controller = Controller::new(cfg, SystemClock::new(), sink, flags, cancel);
            if let Some(seed) = playlist_seed {
                controller = controller.with_seed(seed);
            }
            if let Some(now) = now_override {
                controller = controller.with_now(now);
            }
            controller.run().context("playback task failed")
        }
    });

    // The window must live on the main thread; this returns once it closes.
    let display_result = display.run();
    if let Err(e) = &display_result {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    display_result
}

fn run_playlist_dry_run(
    cfg: &Configuration,
    iterations: usize,
    now_override: Option<SystemTime>,
    seed: Option<u64>,
) -> Result<()> {
    let now = now_override.unwrap_or_else(SystemTime::now);
    let active = ActiveConfig::from_json_file(&cfg.active_config_path).unwrap_or_else(|err| {
        tracing::warn!("using default settings: {err:#}");
        ActiveConfig::default()
    });
    let items = MediaIndexer::from_disk(cfg).index(&active.display_sources);
    let boosts = BoostSettings::from_active(&active);

    println!(
        "# playlist dry run\n# items: {}\n# sources: {}\n# now: {}\n# iterations: {}\n# seed: {}\n",
        items.len(),
        active.display_sources.join(", "),
        format_rfc3339(now),
        iterations,
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    if items.is_empty() {
        println!("(no media discovered under {})", cfg.prepared_dir.display());
        return Ok(());
    }

    println!("# weights (multiplicity per lap):");
    for item in &items {
        let multiplicity = boosts.multiplicity_for(item, now);
        println!("  {:>3} × {}", multiplicity, item.display_path.display());
    }

    let plan = simulate_playlist(&items, &boosts, now, iterations, seed);

    println!("\n# planned order:");
    if plan.is_empty() {
        println!("(playlist empty)");
    } else {
        for (idx, path) in plan.iter().enumerate() {
            println!("  {:>4}: {}", idx + 1, path.display());
        }
    }

    Ok(())
}
