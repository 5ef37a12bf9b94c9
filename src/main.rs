//! Sightsong CLI - drive the engine from recorded detections

use clap::{Parser, Subcommand};
use sightsong::render::write_wav;
use sightsong::{
    Catalog, DetectionScript, DetectionSource, Engine, EngineConfig, RecordingToneService,
    RenderConfig, RenderStats, RenderToneService, ScriptedSource, ToneService,
};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sightsong")]
#[command(about = "Turn object detections into music", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a detection script and report what the engine did
    Run {
        /// Detection script (JSON)
        script: PathBuf,

        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the tone command log as JSON
        #[arg(long)]
        commands: Option<PathBuf>,
    },

    /// Replay a detection script through the built-in synthesizer to WAV
    Render {
        /// Detection script (JSON)
        script: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sample rate in Hz (default: 44100)
        #[arg(short, long, default_value = "44100")]
        sample_rate: u32,

        /// Seconds rendered after the last frame (default: 2.0)
        #[arg(short, long, default_value = "2.0")]
        tail: f64,
    },

    /// List scales, rhythm patterns, drum patterns and timbres
    Catalog,

    /// Print the default configuration as TOML
    Config,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    })
}

/// Feed every frame, one tick per frame interval, then let stale voices
/// time out and drain.
fn replay<T: ToneService>(engine: &mut Engine<T>, script: DetectionScript) {
    let dt = script.frame_interval();
    let settle = engine.config().stale_timeout()
        + engine.config().drain_delay()
        + engine.config().sweep_interval();
    let mut source = ScriptedSource::new(script);

    engine.start();
    while !source.is_exhausted() {
        engine.poll(&mut source);
        engine.tick(dt);
    }

    let settle_ticks = (settle / dt).ceil() as usize;
    for _ in 0..settle_ticks {
        engine.tick(dt);
    }
    engine.stop();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            config,
            commands,
        } => {
            let config = load_config(config.as_deref())?;
            let script = DetectionScript::load(&script)?;
            let frames = script.frames.len();
            let duration = script.duration();

            let mut engine = Engine::new(config, RecordingToneService::new())?;
            let mapped = Rc::new(Cell::new(0usize));
            let counter = mapped.clone();
            engine.on_musical_event(move |_| counter.set(counter.get() + 1));
            replay(&mut engine, script);
            let tone = engine.teardown();

            println!("Sightsong run");
            println!("=============");
            println!("Frames:        {frames} ({duration:.2}s)");
            println!("Mapped events: {}", mapped.get());
            println!("Commands:      {}", tone.commands().len());
            println!(
                "Voices:        {}",
                tone.count_where(|c| matches!(c, sightsong::tone::ToneCall::CreateVoice { .. }))
            );
            println!(
                "Drum hits:     {}",
                tone.count_where(|c| matches!(c, sightsong::tone::ToneCall::TriggerDrum { .. }))
            );
            println!(
                "Glides:        {}",
                tone.count_where(|c| matches!(c, sightsong::tone::ToneCall::SetPitch { .. }))
            );

            if let Some(path) = commands {
                let json = serde_json::to_string_pretty(tone.commands())?;
                std::fs::write(&path, json)?;
                info!("Wrote command log to {}", path.display());
            }
        }

        Commands::Render {
            script,
            output,
            config,
            sample_rate,
            tail,
        } => {
            let config = load_config(config.as_deref())?;
            let script = DetectionScript::load(&script)?;

            println!("Sightsong Renderer");
            println!("==================");
            println!("Frames:      {}", script.frames.len());
            println!("Output:      {}", output.display());
            println!("Sample rate: {sample_rate} Hz");
            println!();

            let tone = RenderToneService::new(RenderConfig {
                sample_rate,
                ..RenderConfig::default()
            })?;
            let mut engine = Engine::new(config, tone)?;
            replay(&mut engine, script);
            let samples = engine.teardown().finish(tail)?;

            write_wav(&output, &samples, sample_rate)?;
            RenderStats::from_samples(&samples, sample_rate).print_summary();
            info!("Render complete: {}", output.display());
        }

        Commands::Catalog => {
            let catalog = Catalog::builtin();
            println!("Scales:         {}", catalog.scale_names().join(", "));
            println!("Rhythms:        {}", catalog.rhythm_names().join(", "));
            println!("Drum patterns:  {}", catalog.drum_pattern_names().join(", "));
            println!("Timbres:");
            for (class, timbre) in catalog.timbre_mappings() {
                println!("  {class:<14} {timbre}");
            }
        }

        Commands::Config => {
            print!("{}", EngineConfig::default().to_toml_string()?);
        }
    }

    Ok(())
}
