use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use extcal_pipeline::{
    CalibrationJob, CalibrationReport, JobSources, RecordedObservations, ReplayObserver,
    ResolutionPolicy,
};
use log::{info, warn};

/// Extrinsic calibration of a multi-camera rig from recorded target observations.
#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-camera extrinsic calibration")]
struct Args {
    /// Camera definitions (YAML or JSON).
    #[arg(long)]
    cameras: PathBuf,

    /// Target definitions (YAML or JSON).
    #[arg(long)]
    targets: PathBuf,

    /// Job definition with scenes and options (YAML or JSON).
    #[arg(long)]
    job: PathBuf,

    /// JSON file of recorded observations per scene and camera.
    #[arg(long)]
    observations: PathBuf,

    /// Override the per-camera observation timeout.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip scenes that reference unknown cameras, targets or points.
    #[arg(long)]
    skip_unresolved: bool,

    /// Override the solver iteration limit.
    #[arg(long)]
    max_iters: Option<usize>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("malformed JSON in {}", path.display()))
}

fn run_job(args: &Args) -> Result<CalibrationReport> {
    let mut job = CalibrationJob::new();
    job.load(&JobSources::new(&args.cameras, &args.targets, &args.job))?;

    let options = job.options_mut();
    if let Some(timeout) = args.timeout_ms {
        options.observation_timeout_ms = timeout;
    }
    if args.skip_unresolved {
        options.resolution = ResolutionPolicy::SkipScene;
    }
    if let Some(max_iters) = args.max_iters {
        options.solver.max_iters = max_iters;
    }

    let recorded: RecordedObservations = load_json_file(&args.observations)?;
    let mut observers = recorded.into_observers();
    let cameras: Vec<String> = job
        .definition()
        .map(|def| def.cameras.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    for camera in cameras {
        let observer = observers.remove(&camera).unwrap_or_else(|| {
            warn!("no recorded observations for camera {camera}");
            ReplayObserver::new(camera.clone())
        });
        job.attach_observer(camera, observer);
    }
    for unused in observers.keys() {
        warn!("recording for unknown camera {unused} ignored");
    }

    let summary = job.run()?;
    info!(
        "calibration finished: rms {:.4} px over {} observations",
        summary.rms_error(),
        job.observation_log().len()
    );
    Ok(job.report()?)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let report = run_job(&args)?;
    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?
        }
        None => println!("{json}"),
    }
    Ok(())
}
