//! Reward Reveal - terminal front end
//!
//! Usage:
//!   rf-reveal spin --spins 3 --speed 4x     - Spin and print each landing
//!   rf-reveal spin --resolver server --reward hoodie
//!   rf-reveal strip --limit 20              - Print the reel strip
//!   rf-reveal plan --reward poster          - Print where a reward would land
//!   rf-reveal speeds                        - List speed options

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use rf_reveal::{
    FallbackPolicy, FixedGeometry, RevealConfig, RevealEngine, RevealEvent, Reward,
    RewardCatalog, RewardId, RewardStrip, ResolverError, SpinSpeed, StripGeometry, StripSurface,
};

const DEMO_CATALOG: &str = include_str!("../../../demos/catalog.json");

// Terminal layout in character cells
const SLOT_CELLS: f64 = 14.0;
const GAP_CELLS: f64 = 1.0;
const VIEWPORT_CELLS: f64 = 80.0;

#[derive(Parser)]
#[command(name = "rf-reveal", about = "Reward Reveal Engine demo")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Reward catalog (JSON array); built-in demo catalog if omitted
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Engine config (JSON); `quick` preset if omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the fallback draw
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Weight the fallback draw by display odds
    #[arg(long, global = true)]
    weighted: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run spins and print each landing
    Spin {
        /// Number of spins
        #[arg(short = 'n', long, default_value_t = 1)]
        spins: usize,

        /// Spin speed (1x, 2x, 4x, 8x)
        #[arg(short, long, default_value = "1x")]
        speed: String,

        /// Where the winning reward comes from
        #[arg(short, long, value_enum, default_value_t = ResolverMode::Local)]
        resolver: ResolverMode,

        /// Reward id the server answers with
        #[arg(long)]
        reward: Option<String>,

        /// Simulated server latency (ms)
        #[arg(long, default_value_t = 250)]
        latency_ms: u64,
    },
    /// Print the reel strip
    Strip {
        /// Slots to print
        #[arg(short, long, default_value_t = 24)]
        limit: usize,
    },
    /// Print where a reward would land
    Plan {
        /// Reward id
        #[arg(long)]
        reward: String,
    },
    /// List speed options
    Speeds,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResolverMode {
    /// No server, local draw only
    Local,
    /// Server answers with --reward
    Server,
    /// Server always errors
    Failing,
    /// Server never answers
    Stalled,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    log::info!("Starting Reward Reveal...");

    let cli = Cli::parse();
    let catalog = load_catalog(&cli.common)?;
    let config = load_config(&cli.common)?;

    match cli.command {
        Commands::Spin {
            spins,
            speed,
            resolver,
            reward,
            latency_ms,
        } => {
            run_spins(
                catalog,
                config,
                spins,
                &speed,
                resolver,
                reward,
                Duration::from_millis(latency_ms),
            )
            .await
        }
        Commands::Strip { limit } => print_strip(&catalog, &config, limit),
        Commands::Plan { reward } => print_plan(&catalog, &config, &reward),
        Commands::Speeds => print_speeds(&config),
    }
}

fn load_catalog(args: &CommonArgs) -> Result<RewardCatalog> {
    let json = match &args.catalog {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?,
        None => DEMO_CATALOG.to_string(),
    };
    let catalog = RewardCatalog::from_json(&json).context("Invalid reward catalog")?;
    log::info!("Loaded {} rewards", catalog.len());
    Ok(catalog)
}

fn load_config(args: &CommonArgs) -> Result<RevealConfig> {
    let mut config = match &args.config {
        Some(path) => RevealConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RevealConfig::quick(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.weighted {
        config.fallback_policy = FallbackPolicy::DisplayOdds;
    }
    Ok(config)
}

fn terminal_geometry() -> StripGeometry {
    StripGeometry::new(SLOT_CELLS, GAP_CELLS, VIEWPORT_CELLS, 0.0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TERMINAL SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Prints which reward sits under the pointer at every offset write
struct TerminalSurface {
    names: Vec<String>,
    geometry: StripGeometry,
}

impl TerminalSurface {
    fn new(catalog: &RewardCatalog, geometry: StripGeometry) -> Self {
        Self {
            names: catalog.iter().map(|r| r.name.clone()).collect(),
            geometry,
        }
    }

    fn slot_under_pointer(&self, offset: f64) -> usize {
        let slot = (offset + self.geometry.centering_correction()) / self.geometry.pitch();
        slot.round().max(0.0) as usize
    }
}

impl StripSurface for TerminalSurface {
    fn set_transition(&self, duration: Option<Duration>) {
        match duration {
            Some(d) => println!("  ~ animating over {:.2}s", d.as_secs_f64()),
            None => log::debug!("transition off"),
        }
    }

    fn set_offset(&self, offset: f64) {
        let slot = self.slot_under_pointer(offset);
        let name = self
            .names
            .get(slot % self.names.len().max(1))
            .map(String::as_str)
            .unwrap_or("?");
        println!("  > offset {:>8.1}  slot {:>3}  [{}]", offset, slot, name);
    }

    fn flush_layout(&self) {}

    fn settled(&self, reward: &Reward) {
        println!(
            "  * {} ({}, {}, odds {})",
            reward.name, reward.tier_label, reward.display_value, reward.display_odds
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

async fn run_spins(
    catalog: RewardCatalog,
    config: RevealConfig,
    spins: usize,
    speed: &str,
    mode: ResolverMode,
    reward: Option<String>,
    latency: Duration,
) -> Result<()> {
    let speed = SpinSpeed::from_label(speed).with_context(|| format!("Unknown speed {}", speed))?;
    let geometry = terminal_geometry();
    let surface = Arc::new(TerminalSurface::new(&catalog, geometry));

    let mut builder = RevealEngine::builder(catalog, FixedGeometry(geometry))
        .config(config)
        .surface(surface);
    builder = match mode {
        ResolverMode::Local => builder,
        ResolverMode::Server => {
            let Some(id) = reward else {
                bail!("--resolver server needs --reward <id>");
            };
            let id = RewardId::new(id);
            builder.resolver_fn(move || {
                let id = id.clone();
                async move {
                    tokio::time::sleep(latency).await;
                    Ok(Some(id))
                }
            })
        }
        ResolverMode::Failing => builder.resolver_fn(move || async move {
            tokio::time::sleep(latency).await;
            Err(ResolverError::Unavailable)
        }),
        ResolverMode::Stalled => builder.resolver_fn(|| std::future::pending()),
    };
    let engine = builder.build().context("Failed to build reveal engine")?;

    if !engine.set_speed(speed) {
        bail!("Speed {} is not enabled", speed);
    }

    let mut events = engine.events();
    for round in 1..=spins {
        println!("Spin {}/{} at {}", round, spins, speed);
        // An ignored trigger produces no events, so waiting would hang
        if let Err(reason) = engine.try_spin() {
            bail!("Spin {} was not started: {}", round, reason);
        }
        loop {
            match events.recv().await {
                Ok(RevealEvent::Settled { source, .. }) => {
                    log::info!("Spin {} settled ({:?})", round, source);
                    break;
                }
                Ok(RevealEvent::Cancelled { session_id }) => {
                    bail!("Session {} was cancelled", session_id);
                }
                Ok(_) => {}
                Err(e) => bail!("Event stream closed: {}", e),
            }
        }
    }

    let stats = engine.stats();
    println!(
        "\n{} spins settled, {} via fallback ({:.0}%)",
        stats.spins_settled,
        stats.fallbacks,
        stats.fallback_rate() * 100.0
    );
    log::debug!("Stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn print_strip(catalog: &RewardCatalog, config: &RevealConfig, limit: usize) -> Result<()> {
    let strip = RewardStrip::build(catalog, config.repeat_factor)?;
    println!(
        "{} slots ({} rewards x {})",
        strip.len(),
        catalog.len(),
        config.repeat_factor
    );
    for slot in strip.slots().iter().take(limit) {
        let name = strip
            .reward_at(catalog, slot.slot_index)
            .map(|r| r.name.as_str())
            .unwrap_or("?");
        println!("{:>5}  {:<20} {}", slot.slot_index, slot.key, name);
    }
    Ok(())
}

fn print_plan(catalog: &RewardCatalog, config: &RevealConfig, reward: &str) -> Result<()> {
    let index = catalog
        .index_of(&RewardId::new(reward))
        .with_context(|| format!("No reward with id {}", reward))?;
    let strip = RewardStrip::build(catalog, config.repeat_factor)?;
    let target = config
        .landing_calculator()
        .plan(index, catalog.len(), strip.len(), &terminal_geometry())?;
    println!("{}", serde_json::to_string_pretty(&target)?);
    Ok(())
}

fn print_speeds(config: &RevealConfig) -> Result<()> {
    if !config.speeds.visible {
        println!("Speed selector hidden");
    }
    for (label, duration) in config.speeds.options(config.base_duration_ms) {
        let marker = if SpinSpeed::from_label(label) == Some(config.initial_speed) {
            "*"
        } else {
            " "
        };
        println!("{} {:>3}  {:.2}s", marker, label, duration.as_secs_f64());
    }
    Ok(())
}
