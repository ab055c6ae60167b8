use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};

use bhvis::{
    ColorMap, EncodeConfig, FfmpegEncoder, Fps, GapPolicy, GridPolicy, ImageSequenceSink,
    InputFormat, JobConfig, RenderSession, SimulationDataset, VisError,
};

#[derive(Parser, Debug)]
#[command(name = "bhvis", version, about = "Render numerical-relativity output into frames")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every time-step into a numbered PNG sequence (optionally encoded with `ffmpeg`).
    Render(RenderArgs),
    /// Render a single time-step as a PNG.
    Frame(FrameArgs),
    /// Print dataset shape and normalization parameters as JSON.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Dataset file or run descriptor.
    #[arg(long)]
    input: PathBuf,

    /// Job config JSON; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input format.
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// What to do when time-steps disagree on their grid.
    #[arg(long, value_enum)]
    grid_policy: Option<GridChoice>,

    /// Clip the color domain to the [P, 100-P] percentiles.
    #[arg(long)]
    clip_percentile: Option<f64>,

    /// Make the color domain symmetric around zero.
    #[arg(long)]
    symmetric: bool,
}

#[derive(Args, Debug)]
struct SceneArgs {
    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second recorded with the sequence.
    #[arg(long)]
    fps: Option<u32>,

    /// Color map.
    #[arg(long, value_enum)]
    colormap: Option<ColormapChoice>,

    /// Reverse the color map.
    #[arg(long)]
    invert_colormap: bool,

    /// Camera mode.
    #[arg(long, value_enum)]
    camera: Option<CameraChoice>,

    /// Camera azimuth in degrees (orbit start for `orbit`).
    #[arg(long, allow_negative_numbers = true)]
    azimuth: Option<f64>,

    /// Camera elevation in degrees.
    #[arg(long, allow_negative_numbers = true)]
    elevation: Option<f64>,

    /// Orbit rate in degrees per unit of simulation time.
    #[arg(long, allow_negative_numbers = true)]
    orbit_rate: Option<f64>,

    /// Iso-contour level as a fraction of the value domain (repeatable).
    #[arg(long = "iso-level")]
    iso_levels: Vec<f64>,

    /// Supersampling factor per axis (1..=4).
    #[arg(long)]
    supersample: Option<u32>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    scene: SceneArgs,

    /// Output directory for the image sequence.
    #[arg(long)]
    output: PathBuf,

    /// Abort the whole run on the first backend failure.
    #[arg(long)]
    strict: bool,

    /// What to do with frames missing after the run.
    #[arg(long, value_enum)]
    gap_policy: Option<GapChoice>,

    /// Worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Share one backend instance between workers.
    #[arg(long)]
    shared_context: bool,

    /// Seconds without progress before the run is abandoned.
    #[arg(long)]
    watchdog_secs: Option<f64>,

    /// Encode the committed sequence to this MP4 (requires `ffmpeg` on PATH).
    #[arg(long)]
    video: Option<PathBuf>,

    /// Fail instead of replacing existing output.
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    scene: SceneArgs,

    /// Time-step index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Auto,
    Dataset,
    StrainRun,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GridChoice {
    Reject,
    Resample,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColormapChoice {
    Viridis,
    Inferno,
    Coolwarm,
    Grayscale,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CameraChoice {
    Fixed,
    Orbit,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GapChoice {
    Abort,
    Keep,
    DuplicatePrevious,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let res = match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Inspect(args) => cmd_inspect(args),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<VisError>() {
        Some(VisError::Gap { .. }) => ExitCode::from(2),
        Some(VisError::Cancelled(_)) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

impl InputArgs {
    fn job_config(&self) -> anyhow::Result<JobConfig> {
        let mut cfg = match &self.config {
            Some(path) => JobConfig::from_path(path)?,
            None => JobConfig::default(),
        };
        if let Some(f) = self.format {
            cfg.load.format = match f {
                FormatChoice::Auto => InputFormat::Auto,
                FormatChoice::Dataset => InputFormat::Dataset,
                FormatChoice::StrainRun => InputFormat::StrainRun,
            };
        }
        if let Some(g) = self.grid_policy {
            cfg.load.grid_policy = match g {
                GridChoice::Reject => GridPolicy::Reject,
                GridChoice::Resample => GridPolicy::Resample,
            };
        }
        if let Some(p) = self.clip_percentile {
            cfg.normalize.clip_percentile = Some(p);
        }
        if self.symmetric {
            cfg.normalize.symmetric = true;
        }
        Ok(cfg)
    }
}

impl SceneArgs {
    fn apply(&self, cfg: &mut JobConfig) -> anyhow::Result<()> {
        if let Some(w) = self.width {
            cfg.render.resolution.width = w;
        }
        if let Some(h) = self.height {
            cfg.render.resolution.height = h;
        }
        if let Some(k) = self.supersample {
            cfg.render.supersample = k;
        }
        if let Some(r) = self.fps {
            cfg.session.fps = Fps::new(r, 1)?;
        }
        if let Some(c) = self.colormap {
            cfg.scene.colormap.map = match c {
                ColormapChoice::Viridis => ColorMap::Viridis,
                ColormapChoice::Inferno => ColorMap::Inferno,
                ColormapChoice::Coolwarm => ColorMap::Coolwarm,
                ColormapChoice::Grayscale => ColorMap::Grayscale,
            };
        }
        if self.invert_colormap {
            cfg.scene.colormap.invert = true;
        }
        let orbit = self.camera.map(|c| matches!(c, CameraChoice::Orbit));
        if orbit.is_some()
            || self.azimuth.is_some()
            || self.elevation.is_some()
            || self.orbit_rate.is_some()
        {
            let cam = cfg.scene.camera;
            cfg.scene.camera = cam.adjusted(orbit, self.azimuth, self.elevation, self.orbit_rate);
        }
        if !self.iso_levels.is_empty() {
            cfg.scene.iso_levels = self.iso_levels.clone();
        }
        Ok(())
    }
}

fn load_and_normalize(
    cfg: &JobConfig,
    input: &Path,
) -> anyhow::Result<(SimulationDataset, bhvis::NormalizationParams)> {
    let dataset = bhvis::load_dataset(input, &cfg.load)
        .with_context(|| format!("load '{}'", input.display()))?;
    let params = bhvis::normalize(&dataset, &cfg.normalize)?;
    Ok((dataset, params))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = args.input.job_config()?;
    args.scene.apply(&mut cfg)?;
    if args.strict {
        cfg.session.failure = bhvis::FailurePolicy::Strict;
    }
    if let Some(g) = args.gap_policy {
        cfg.session.gap = match g {
            GapChoice::Abort => GapPolicy::Abort,
            GapChoice::Keep => GapPolicy::Keep,
            GapChoice::DuplicatePrevious => GapPolicy::DuplicatePrevious,
        };
    }
    if args.workers.is_some() {
        cfg.session.workers = args.workers;
    }
    if args.shared_context {
        cfg.session.context = bhvis::ContextPolicy::Shared;
    }
    if let Some(s) = args.watchdog_secs {
        cfg.session.watchdog_secs = s;
    }
    cfg.output.dir = Some(args.output.clone());
    if args.video.is_some() {
        cfg.output.video = args.video.clone();
    }
    if args.no_overwrite {
        cfg.output.overwrite = false;
    }
    cfg.validate()?;

    let (dataset, params) = load_and_normalize(&cfg, &args.input.input)?;
    let session = RenderSession::new(
        cfg.session.clone(),
        cfg.scene.clone(),
        cfg.render,
        bhvis::backend_factory(cfg.backend),
    )?;

    let mut sink = ImageSequenceSink::new(&args.output, cfg.output.overwrite);
    let summary = session.run(Arc::new(dataset), Arc::new(params), &mut sink)?;
    eprintln!("{summary}");
    if let Some(err) = summary.gap_error() {
        if summary.committed {
            eprintln!("wrote {} (incomplete)", args.output.display());
        }
        return Err(err.into());
    }
    eprintln!("wrote {}", args.output.display());

    let Some(video) = &cfg.output.video else {
        if cfg.output.verify {
            bhvis::verify_sequence(&args.output)?;
        }
        return Ok(());
    };
    let manifest = bhvis::verify_sequence(&args.output)?;
    if !bhvis::is_ffmpeg_on_path() {
        anyhow::bail!("ffmpeg not found on PATH (frames are in '{}')", args.output.display());
    }
    let enc = FfmpegEncoder::new(EncodeConfig::from_manifest(
        &args.output,
        &manifest,
        video,
        cfg.output.overwrite,
    ))?;
    enc.run()?;
    eprintln!("wrote {}", video.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut cfg = args.input.job_config()?;
    args.scene.apply(&mut cfg)?;
    cfg.validate()?;

    let (dataset, params) = load_and_normalize(&cfg, &args.input.input)?;
    let session = RenderSession::new(
        cfg.session.clone(),
        cfg.scene.clone(),
        cfg.render,
        bhvis::backend_factory(cfg.backend),
    )?;
    let frame = session.render_one(&dataset, &params, bhvis::FrameIndex(args.index))?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let cfg = args.input.job_config()?;
    cfg.normalize.validate()?;
    let (dataset, params) = load_and_normalize(&cfg, &args.input.input)?;

    let first = dataset
        .steps()
        .first()
        .context("dataset has no time-steps")?;
    let mut labels: Vec<&str> = dataset
        .steps()
        .iter()
        .flat_map(|s| s.markers.iter().map(|m| m.label.as_str()))
        .collect();
    labels.sort_unstable();
    labels.dedup();

    let report = serde_json::json!({
        "metadata": dataset.metadata(),
        "steps": dataset.len(),
        "time_range": dataset.time_range(),
        "field": {
            "kind": first.field.kind(),
            "vector": first.field.values().is_vector(),
            "samples": first.field.values().len(),
        },
        "markers": labels,
        "normalization": params,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
