use clap::{Parser, Subcommand, ValueEnum};
use cli::{render_image, RenderManifest};
use color_eyre::eyre::{Result, WrapErr};
use overlay::{legend, DisplayOptions, OverlayConfig, Sample};
use schemars::schema_for;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one photo with its detection overlays
    Render {
        /// Path to the photo
        #[arg(short, long)]
        image: PathBuf,
        /// Path to the sample JSON
        #[arg(short, long)]
        sample: PathBuf,
        /// Where to write the composited PNG
        #[arg(short, long)]
        output: PathBuf,
        /// Overlay configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Job the sample belongs to
        #[arg(long, default_value = "0")]
        job_id: i64,
        /// Output width in pixels (keeps aspect ratio)
        #[arg(long)]
        width: Option<u32>,
        /// Also write the box layer as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Mask fill opacity (clamped to 0.1..=0.8)
        #[arg(long)]
        opacity: Option<f32>,
        #[arg(long)]
        no_boxes: bool,
        #[arg(long)]
        no_masks: bool,
        /// Draw placeholder regions when the sample has none
        #[arg(long)]
        demo: bool,
    },
    /// Render every job in a batch manifest
    Process {
        /// Path to the manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Print the concept legend of a sample
    Legend {
        #[arg(short, long)]
        sample: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Config)]
        target: SchemaTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaTarget {
    Config,
    Sample,
    Manifest,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            image,
            sample,
            output,
            config,
            job_id,
            width,
            svg,
            opacity,
            no_boxes,
            no_masks,
            demo,
        } => {
            let config = match config {
                Some(path) => OverlayConfig::from_file(&path)
                    .wrap_err_with(|| format!("loading config {}", path.display()))?,
                None => OverlayConfig::default(),
            };
            let mut display = config.display;
            display.show_boxes &= !no_boxes;
            display.show_masks &= !no_masks;
            display.demo |= demo;
            if let Some(opacity) = opacity {
                display.opacity = DisplayOptions::clamp_opacity(opacity);
            }
            render_one(&config, &image, &sample, &output, svg.as_deref(), job_id, display, width).await?;
        }
        Commands::Process { manifest } => {
            process_manifest(&manifest).await?;
        }
        Commands::Legend { sample, json } => {
            let sample = Sample::from_json_file(&sample)?;
            let entries = legend(&sample.regions);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let score = entry
                        .best_score
                        .map(|s| format!("{:.0}%", s * 100.0))
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}  {:<24} {:>4}  {}", entry.color_hex, entry.label, entry.count, score);
                }
            }
        }
        Commands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Config => OverlayConfig::schema(),
                SchemaTarget::Sample => schema_for!(Sample),
                SchemaTarget::Manifest => schema_for!(RenderManifest),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn render_one(
    config: &OverlayConfig,
    image_path: &Path,
    sample_path: &Path,
    output: &Path,
    svg: Option<&Path>,
    job_id: i64,
    display: DisplayOptions,
    width: Option<u32>,
) -> Result<()> {
    let photo = image::open(image_path)
        .wrap_err_with(|| format!("opening {}", image_path.display()))?
        .to_rgba8();
    let sample = Sample::from_json_file(sample_path)
        .wrap_err_with(|| format!("reading {}", sample_path.display()))?;
    info!("Rendering {:?} ({} regions, {} masks)", image_path, sample.regions.len(), sample.mask_count());

    let rendered = render_image(config, photo, sample, job_id, display, width).await?;
    let report = &rendered.frame.report;
    if report.failed > 0 {
        warn!("{} of {} masks could not be drawn", report.failed, report.drawn + report.failed);
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rendered.image.save(output)?;
    info!("Wrote {:?}", output);

    if let Some(svg_path) = svg {
        match &rendered.frame.vector {
            Some(vector) => {
                std::fs::write(svg_path, vector.to_svg())?;
                info!("Wrote {:?}", svg_path);
            }
            None => warn!("Boxes are hidden; no SVG written"),
        }
    }
    Ok(())
}

async fn process_manifest(manifest_path: &Path) -> Result<()> {
    let manifest = RenderManifest::from_file(manifest_path)?;
    info!("Manifest: {} jobs -> {}", manifest.jobs.len(), manifest.output_dir);

    std::fs::create_dir_all(&manifest.output_dir)?;

    let base = manifest_path.parent().unwrap_or(Path::new("."));
    for job in &manifest.jobs {
        let output = manifest.output_path(job);
        let svg = manifest.svg.then(|| output.with_extension("svg"));
        info!("Processing '{}' -> {:?}", job.name, output);

        if let Err(e) = render_one(
            &manifest.config,
            &base.join(&job.image),
            &base.join(&job.sample),
            &output,
            svg.as_deref(),
            job.job_id.unwrap_or(manifest.job_id),
            manifest.display_for(job),
            manifest.width,
        )
        .await
        {
            warn!("Skipping '{}': {:#}", job.name, e);
        }
    }

    info!("✅ Batch rendering completed!");
    Ok(())
}
