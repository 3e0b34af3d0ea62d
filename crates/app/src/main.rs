use std::{path::PathBuf, time::Duration};

use beatteller_core::{
    AppConfig, Backdrop, BackdropEngine, BackdropError, BackdropStack, CarouselDriver,
    SearchContext,
};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn main() -> beatteller_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let engine = BackdropEngine::from_config(&config.backgrounds)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Classify { text } => run_classify(&engine, &text),
        Commands::Pick {
            query,
            mood,
            genre,
            seed,
        } => runtime.block_on(run_pick(
            &engine,
            SearchContext { query, mood, genre },
            seed,
        )),
        Commands::Card { names, seed } => run_card(&engine, &names, seed),
        Commands::Carousel { ticks, interval_ms } => {
            let period = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| engine.carousel_period());
            runtime.block_on(run_carousel(&engine, ticks, period))
        }
        Commands::Verify => runtime.block_on(run_verify(&engine)),
    }
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn print_json(value: &serde_json::Value) -> beatteller_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_classify(engine: &BackdropEngine, text: &str) -> beatteller_core::Result<()> {
    let classification = engine.classifier().explain(text);
    print_json(&json!(classification))
}

async fn run_pick(
    engine: &BackdropEngine,
    context: SearchContext,
    seed: Option<u64>,
) -> beatteller_core::Result<()> {
    tracing::info!(query = %context.query, "selecting backdrop");

    let background = engine.context_background(rng(seed));
    let mut stack = BackdropStack::new();
    stack.push(Backdrop::from(Some(engine.carousel().current())));
    let layer = stack.push(Backdrop::default());

    if let Some(handle) = background.set_context(context)? {
        stack.update(layer, Backdrop::from(&background.state()));
        tracing::debug!(loading = stack.compose().loading, "waiting for preload");
        handle
            .await
            .map_err(|err| BackdropError::msg(format!("preload task failed: {err}")))?;
    }

    let state = background.state();
    stack.update(layer, Backdrop::from(&state));
    print_json(&json!({
        "state": state,
        "backdrop": stack.compose(),
    }))
}

fn run_card(
    engine: &BackdropEngine,
    names: &[String],
    seed: Option<u64>,
) -> beatteller_core::Result<()> {
    let mut random = rng(seed);
    let cards: Vec<_> = names
        .iter()
        .map(|name| {
            let mut card = engine.card_background(StdRng::seed_from_u64(random.gen()));
            let image = card.set_name(name).cloned();
            json!({ "name": name, "image": image })
        })
        .collect();
    print_json(&json!(cards))
}

async fn run_carousel(
    engine: &BackdropEngine,
    ticks: usize,
    period: Duration,
) -> beatteller_core::Result<()> {
    let (active, activation) = watch::channel(true);
    let driver = CarouselDriver::spawn(engine.carousel(), period, activation)?;
    let mut frames = driver.subscribe();

    let first = driver.current();
    println!("{} {}", first.index, first.image);
    for _ in 0..ticks {
        if frames.changed().await.is_err() {
            break;
        }
        let frame = frames.borrow_and_update().clone();
        println!("{} {}", frame.index, frame.image);
    }

    drop(active);
    let carousel = driver.join().await?;
    tracing::info!(index = carousel.index(), "carousel stopped");
    Ok(())
}

async fn run_verify(engine: &BackdropEngine) -> beatteller_core::Result<()> {
    let loader = engine.loader();
    tracing::info!(root = %loader.root().display(), "verifying backdrop assets");

    let problems = engine.verify_assets(&loader).await;
    print_json(&json!(problems))?;
    if problems.is_empty() {
        Ok(())
    } else {
        Err(BackdropError::msg(format!(
            "{} backdrop asset(s) failed to load",
            problems.len()
        )))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Contextual backdrops for BeatTeller", long_about = None)]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show which backdrop category a piece of text falls into.
    Classify {
        text: String,
    },
    /// Pick and preload a backdrop for a search context.
    Pick {
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(short, long)]
        mood: Option<String>,
        #[arg(short, long)]
        genre: Option<String>,
        /// Seed for reproducible selection.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Pick card backdrops for item names.
    Card {
        names: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run the rotating backdrop for a number of ticks.
    Carousel {
        #[arg(short, long, default_value_t = 14)]
        ticks: usize,
        /// Overrides the configured rotation period.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Preload every pooled image once and report failures.
    Verify,
}
