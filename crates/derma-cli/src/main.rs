use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use derma_core::{Catalog, FaceDetector, Pipeline, PipelineConfig, SkinBlobDetector, SkinTag};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod advisor;
mod config;
mod engine;
mod report;

use advisor::{Advisor, RuleAdvisor};
use config::{Config, DetectorKind};
use report::{ErrorReport, Report};

#[derive(Parser)]
#[command(name = "derma", about = "Derma skin assessment CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze face photos and recommend a routine and products
    Analyze {
        /// Photos to analyze
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Self-declared skin type (e.g., "oily", "sensitive")
        #[arg(short, long, default_value = "unspecified")]
        skin_type: String,
        /// Known allergies, comma separated
        #[arg(short, long, default_value = "none")]
        allergies: String,
    },
    /// Print skin metrics for a photo without recommendations
    Metrics {
        image: PathBuf,
    },
    /// Write the canonical face crop of a photo to a file
    Crop {
        image: PathBuf,
        /// Output path; the format follows the extension
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List catalog products, optionally only those matching a skin tag
    Catalog {
        /// oily, dry, normal or sensitive
        #[arg(short, long)]
        tag: Option<SkinTag>,
    },
    /// Print the effective pipeline configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let code = match cli.command {
        Commands::Analyze {
            images,
            skin_type,
            allergies,
        } => run_analyze(&config, images, &skin_type, &allergies).await?,
        Commands::Metrics { image } => {
            let pipeline = load_pipeline(&config)?;
            let bytes = read_image(&image).await?;
            match pipeline.measure(&bytes) {
                Ok((face, metrics)) => {
                    print_json(&json!({ "face": face.region(), "analysis": metrics }))?;
                    0
                }
                Err(e) => report_failure(ErrorReport::for_kind(e.kind()), &e)?,
            }
        }
        Commands::Crop { image, output } => {
            let pipeline = load_pipeline(&config)?;
            let bytes = read_image(&image).await?;
            match pipeline.locate_and_crop(&bytes) {
                Ok(face) => {
                    face.into_image()
                        .save(&output)
                        .with_context(|| format!("writing crop to {}", output.display()))?;
                    println!("{}", output.display());
                    0
                }
                Err(e) => {
                    let e = derma_core::AnalysisError::from(e);
                    report_failure(ErrorReport::for_kind(e.kind()), &e)?
                }
            }
        }
        Commands::Catalog { tag } => {
            let catalog = load_catalog(&config)?;
            let products: Vec<_> = match tag {
                Some(tag) => derma_core::matcher::qualifying(&catalog, tag).into_iter().cloned().collect(),
                None => catalog.products().to_vec(),
            };
            print_json(&products)?;
            0
        }
        Commands::Config => {
            let pipeline_config = load_pipeline_config(&config)?;
            print!("{}", pipeline_config.to_toml_string()?);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run_analyze(config: &Config, images: Vec<PathBuf>, skin_type: &str, allergies: &str) -> Result<i32> {
    let pipeline_config = load_pipeline_config(config)?;
    let advisor = RuleAdvisor::new(pipeline_config.matcher.clone());
    let pipeline = Arc::new(build_pipeline(config, pipeline_config)?);
    let engine = engine::spawn_engine(pipeline, config.workers, Duration::from_secs(config.timeout_secs))?;

    let mut tasks = tokio::task::JoinSet::new();
    for (index, path) in images.iter().enumerate() {
        let bytes = read_image(path).await?;
        let engine = engine.clone();
        let skin_type = skin_type.to_string();
        tasks.spawn(async move {
            let id = Uuid::new_v4();
            (index, id, engine.analyze(id, bytes, &skin_type).await)
        });
    }

    let mut outcomes = Vec::with_capacity(images.len());
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.context("analysis task panicked")?);
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut code = 0;
    let mut envelopes = Vec::with_capacity(outcomes.len());
    for (index, id, outcome) in outcomes {
        let envelope = match outcome {
            Ok(assessment) => {
                let advice = advisor.consult(&assessment.metrics, skin_type, allergies);
                serde_json::to_value(Report::new(id.to_string(), assessment, advice))?
            }
            Err(e) => {
                tracing::warn!(image = %images[index].display(), request_id = %id, error = %e, "analysis failed");
                let failure = ErrorReport::from_engine(&e);
                code = code.max(failure.exit_code());
                serde_json::to_value(failure)?
            }
        };
        envelopes.push(envelope);
    }

    match envelopes.len() {
        1 => print_json(&envelopes[0])?,
        _ => print_json(&envelopes)?,
    }
    Ok(code)
}

fn load_pipeline_config(config: &Config) -> Result<PipelineConfig> {
    let pipeline_config = match &config.config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    pipeline_config.validate()?;
    Ok(pipeline_config)
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    Ok(match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    })
}

fn load_pipeline(config: &Config) -> Result<Pipeline> {
    let pipeline_config = load_pipeline_config(config)?;
    build_pipeline(config, pipeline_config)
}

fn build_pipeline(config: &Config, pipeline_config: PipelineConfig) -> Result<Pipeline> {
    let catalog = load_catalog(config)?;
    let detector: Box<dyn FaceDetector> = match config.detector {
        DetectorKind::Skin => Box::new(SkinBlobDetector::new(pipeline_config.skin)),
        DetectorKind::Scrfd => scrfd_detector(config)?,
    };
    Ok(Pipeline::new(pipeline_config, detector, catalog)?)
}

#[cfg(feature = "scrfd")]
fn scrfd_detector(config: &Config) -> Result<Box<dyn FaceDetector>> {
    let path = config.scrfd_model_path();
    Ok(Box::new(derma_core::ScrfdDetector::load(&path)?))
}

#[cfg(not(feature = "scrfd"))]
fn scrfd_detector(_config: &Config) -> Result<Box<dyn FaceDetector>> {
    anyhow::bail!("DERMA_DETECTOR=scrfd requires a build with the `scrfd` feature")
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_failure(failure: ErrorReport, cause: &derma_core::AnalysisError) -> Result<i32> {
    tracing::warn!(error = %cause, status = failure.status, "analysis failed");
    print_json(&failure)?;
    Ok(failure.exit_code())
}
