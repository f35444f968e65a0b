mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tempora_kernel::{KernelConfig, RewindCommand, RewindPhase, TimeScaleCommand, TimeScaleSource};
use tempora_history::Timeline;
use tracing_subscriber::EnvFilter;

use crate::demo::Scene;

#[derive(Parser)]
#[command(name = "tempora-cli", about = "CLI for the tempora time kernel")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Kernel config file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and derived timing values
    Info,
    /// Run the demo scene in record mode and print a history summary
    Simulate {
        /// Number of updates to run
        #[arg(short, long, default_value = "600")]
        updates: u32,
        /// Number of tracked objects
        #[arg(short, long, default_value = "32")]
        entities: usize,
        /// Player speed multiplier
        #[arg(short, long, default_value = "1.0")]
        speed: f32,
    },
    /// Record, scrub back, then commit to the previewed tick
    Rewind {
        /// Updates to record before rewinding
        #[arg(short, long, default_value = "600")]
        updates: u32,
        /// Seconds of history to scrub back
        #[arg(short, long, default_value = "3.0")]
        back: f32,
        /// Scrub speed relative to real time
        #[arg(long, default_value = "4.0")]
        scrub_speed: f32,
    },
    /// Print the effective kernel config
    Config {
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };
    tracing::debug!(path = ?cli.config, multiplayer = config.multiplayer_session, "kernel config ready");

    match cli.command {
        Commands::Info => {
            println!("tempora-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: {}", tempora_kernel::crate_info());
            println!("history: {}", tempora_history::crate_info());
            println!(
                "timing: {:.1} ticks/s, horizon {} ticks, base sample interval {} ticks",
                config.ticks_per_second(),
                config.horizon_ticks(),
                config.base_sample_interval()
            );
        }
        Commands::Simulate {
            updates,
            entities,
            speed,
        } => {
            let dt = config.clock.fixed_delta;
            let mut timeline = Timeline::new(config.clone());
            let mut scene = Scene::new(&config, entities)?;
            timeline.submit(TimeScaleCommand::SetSpeed {
                scale: speed,
                source: TimeScaleSource::Player,
                source_id: 0,
                priority: None,
            });

            let mut recorded = 0;
            for _ in 0..updates {
                recorded += scene.update(&mut timeline, dt).recorded.recorded;
            }
            println!("{}", scene.summary(&timeline));
            println!("samples written: {recorded}");
            println!("stockpile: {:?}", scene.stockpile());
        }
        Commands::Rewind {
            updates,
            back,
            scrub_speed,
        } => {
            let dt = config.clock.fixed_delta;
            let mut timeline = Timeline::new(config.clone());
            let mut scene = Scene::new(&config, 8)?;
            for _ in 0..updates {
                scene.update(&mut timeline, dt);
            }
            let present = timeline.tick();
            println!(
                "recorded to tick {present}, lead offset {:.2}",
                scene.lead_offset()
            );

            let back_ticks = (back.max(0.0) * config.ticks_per_second()).round() as u64;
            let target = present.saturating_sub(back_ticks);
            timeline.submit(RewindCommand::BeginPreview { scrub_speed });
            // Bounded so a zero scrub speed cannot spin forever.
            for _ in 0..(updates.max(1) * 4) {
                scene.update(&mut timeline, dt);
                if timeline.preview_tick().is_some_and(|tick| tick <= target) {
                    break;
                }
            }
            println!("preview at tick {:?}", timeline.preview_tick());

            timeline.submit(RewindCommand::EndScrubPreview);
            scene.update(&mut timeline, dt);
            timeline.submit(RewindCommand::CommitFromPreview);
            let report = scene.update(&mut timeline, dt);
            if timeline.phase() != RewindPhase::Inactive {
                anyhow::bail!("rewind session still open after commit");
            }
            match report.committed_tick {
                Some(tick) => println!(
                    "committed to tick {tick}, lead offset {:.2}",
                    scene.lead_offset()
                ),
                None => println!("commit skipped"),
            }
            println!("{}", scene.summary(&timeline));
            println!("stockpile: {:?}", scene.stockpile());
        }
        Commands::Config { format } => {
            let text = match format {
                ConfigFormat::Yaml => config.to_yaml()?,
                ConfigFormat::Json => config.to_json()?,
            };
            println!("{text}");
        }
    }

    Ok(())
}
