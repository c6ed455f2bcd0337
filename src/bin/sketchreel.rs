use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use sketchreel::export::{ExportPhase, FfmpegCapture, FfmpegOpts};
use sketchreel::services::{
    DisabledSynthesizer, HttpPlanner, HttpSynthesizer, Planner, StaticPlanner, Synthesizer,
};
use sketchreel::{Config, HistoryStore, Presenter, Step};

#[derive(Parser, Debug)]
#[command(name = "sketchreel", version)]
struct Cli {
    /// Config JSON (defaults apply when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the planner for steps and print them as JSON.
    Plan(PlanArgs),
    /// Capture every step's code and report problems.
    Check(StepsArgs),
    /// Render one step's final frame as a PNG.
    Preview(PreviewArgs),
    /// Record all steps with narration into an MP4 (requires `ffmpeg` on PATH).
    Export(ExportArgs),
    /// List or clear past queries.
    History(HistoryArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// What to draw.
    query: String,

    /// Serve steps from this JSON file instead of the planner service.
    #[arg(long)]
    steps: Option<PathBuf>,

    /// Write the steps here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct StepsArgs {
    /// Steps JSON: an array of `{title, description, code}`.
    #[arg(long = "steps")]
    steps: PathBuf,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    #[arg(long = "steps")]
    steps: PathBuf,

    /// Step index (0-based).
    #[arg(long, default_value_t = 0)]
    step: usize,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[arg(long = "steps")]
    steps: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Skip narration even if a synthesis service is configured.
    #[arg(long)]
    silent: bool,
}

#[derive(Parser, Debug)]
struct HistoryArgs {
    /// Remove every record.
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Plan(args) => cmd_plan(&config, args).await,
        Command::Check(args) => cmd_check(&config, args),
        Command::Preview(args) => cmd_preview(config, args),
        Command::Export(args) => cmd_export(config, args).await,
        Command::History(args) => cmd_history(&config, args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn read_steps(path: &Path) -> anyhow::Result<Vec<Step>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read steps '{}'", path.display()))?;
    Ok(sketchreel::step::steps_from_json(&text)?)
}

fn open_history(config: &Config) -> anyhow::Result<Option<HistoryStore>> {
    match &config.history_path {
        Some(path) => Ok(Some(HistoryStore::open(path, config.history_cap)?)),
        None => Ok(None),
    }
}

async fn cmd_plan(config: &Config, args: PlanArgs) -> anyhow::Result<()> {
    let planner: Box<dyn Planner> = match (&args.steps, &config.planner.url) {
        (Some(path), _) => Box::new(StaticPlanner::from_file(path)?),
        (None, Some(_)) => Box::new(HttpPlanner::new(&config.planner)?),
        (None, None) => anyhow::bail!(
            "no planner configured: pass --steps or set {}",
            sketchreel::config::ENV_PLANNER_URL
        ),
    };
    let steps = planner.generate_steps(&args.query).await?;

    if let Some(mut history) = open_history(config)? {
        history.record(&args.query, steps.clone())?;
    }

    let json = serde_json::to_string_pretty(&steps).context("serialize steps")?;
    match args.out {
        Some(out) => {
            sketchreel::export::ensure_parent_dir(&out)?;
            std::fs::write(&out, json).with_context(|| format!("write '{}'", out.display()))?;
            eprintln!("wrote {} steps to {}", steps.len(), out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_check(config: &Config, args: StepsArgs) -> anyhow::Result<()> {
    let steps = read_steps(&args.steps)?;
    let mut failures = 0usize;
    for (i, step) in steps.iter().enumerate() {
        match sketchreel::capture(&step.code, config.canvas) {
            Ok(commands) => println!("step {i} '{}': {} commands", step.title, commands.len()),
            Err(e) => {
                failures += 1;
                println!("step {i} '{}': {e}", step.title);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} steps failed to capture", steps.len());
    }
    Ok(())
}

fn cmd_preview(config: Config, args: PreviewArgs) -> anyhow::Result<()> {
    let steps = read_steps(&args.steps)?;
    let presenter = Presenter::start(config, Arc::new(DisabledSynthesizer))?;
    presenter.load_steps(steps)?;
    let surface = presenter.render_step_image(args.step)?;
    presenter.shutdown();
    surface.save_png(&args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn cmd_export(config: Config, args: ExportArgs) -> anyhow::Result<()> {
    let steps = read_steps(&args.steps)?;
    let synth: Arc<dyn Synthesizer> = match (&config.synth.url, args.silent) {
        (Some(_), false) => Arc::new(HttpSynthesizer::new(&config.synth)?),
        _ => Arc::new(DisabledSynthesizer),
    };
    let presenter = Presenter::start(config, synth)?;
    presenter.load_steps(steps)?;

    let mut phases = presenter.subscribe_export_phase();
    let progress = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            match phase {
                ExportPhase::PreparingAudio { done, total } => {
                    eprintln!("preparing narration {done}/{total}")
                }
                ExportPhase::Recording { step, total } => {
                    eprintln!("recording step {}/{total}", step + 1)
                }
                ExportPhase::Finalizing => eprintln!("finalizing"),
                ExportPhase::Idle => {}
            }
        }
    });

    let sink = FfmpegCapture::new(FfmpegOpts::new(&args.out));
    let result = presenter.export(Box::new(sink)).await;
    presenter.shutdown();
    progress.abort();

    let recording = result?;
    eprintln!(
        "wrote {} ({} frames, {:.1}s, {}/{} steps narrated)",
        args.out.display(),
        recording.frames,
        recording.duration().as_secs_f64(),
        recording.narrated_steps(),
        recording.marks.len()
    );
    Ok(())
}

fn cmd_history(config: &Config, args: HistoryArgs) -> anyhow::Result<()> {
    let Some(mut history) = open_history(config)? else {
        anyhow::bail!("history is disabled: set history_path in the config file");
    };
    if args.clear {
        history.clear()?;
        eprintln!("cleared {}", history.path().display());
        return Ok(());
    }
    for record in history.records() {
        println!("{}\t{}\t{} steps", record.timestamp, record.query, record.steps.len());
    }
    Ok(())
}
