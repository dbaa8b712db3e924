use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facemetric::{AnchorGroup, FaceSession, DEFAULT_MAX_DISTANCE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod upload;

use upload::{FileSelection, UploadPreview};

#[derive(Parser)]
#[command(name = "facemetric", about = "Face distances from labeled anchor references")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute distances from probe images to the nearest anchor reference
    Distance {
        /// Directory containing the three ONNX model files
        #[arg(long, default_value_os_t = facemetric::default_model_dir())]
        model_dir: PathBuf,
        /// Anchor group as `label=img1,img2,...` (repeatable)
        #[arg(long = "anchor", required = true)]
        anchors: Vec<String>,
        /// Maximum descriptor distance for a positive label
        #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE)]
        max_distance: f32,
        /// Probes as `name=image`
        #[arg(required = true)]
        probes: Vec<String>,
    },
    /// Preview a local image file as a data URL
    Preview {
        /// File to preview
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Distance {
            model_dir,
            anchors,
            max_distance,
            probes,
        } => run_distance(model_dir, anchors, max_distance, probes).await,
        Commands::Preview { file } => run_preview(file).await,
    }
}

async fn run_distance(
    model_dir: PathBuf,
    anchors: Vec<String>,
    max_distance: f32,
    probes: Vec<String>,
) -> Result<()> {
    let mut session = FaceSession::new();
    session
        .load_models(&model_dir)
        .await
        .with_context(|| format!("loading models from {}", model_dir.display()))?;

    let mut groups = Vec::with_capacity(anchors.len());
    for spec in &anchors {
        let (label, paths) = parse_anchor_spec(spec)?;
        let mut images = Vec::with_capacity(paths.len());
        for path in &paths {
            images.push(
                image::open(path).with_context(|| format!("opening {}", path.display()))?,
            );
        }
        groups.push(AnchorGroup {
            label: label.to_string(),
            images,
        });
    }
    session.set_anchor_references(&groups, max_distance)?;

    for spec in &probes {
        let (name, path) = parse_probe_spec(spec)?;
        let probe =
            image::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let distance = session.add_name_distance(name, &probe)?;
        println!("{name} -> {distance:.4}");
    }

    println!("{}", serde_json::to_string_pretty(session.distances())?);
    Ok(())
}

async fn run_preview(file: PathBuf) -> Result<()> {
    let mut preview = UploadPreview::new();
    preview
        .handle_selection(Some(FileSelection::from_path(file)))
        .await;
    println!("{}", preview.render());
    Ok(())
}

/// Parse `label=img1,img2,...` into a label and image paths.
fn parse_anchor_spec(spec: &str) -> Result<(&str, Vec<PathBuf>)> {
    let Some((label, paths)) = spec.split_once('=') else {
        bail!("anchor must be `label=img1,img2,...`, got `{spec}`");
    };
    if label.is_empty() {
        bail!("anchor label must not be empty in `{spec}`");
    }

    let paths: Vec<PathBuf> = paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        bail!("anchor `{label}` lists no images");
    }

    Ok((label, paths))
}

/// Parse `name=image` into a probe name and image path.
fn parse_probe_spec(spec: &str) -> Result<(&str, PathBuf)> {
    let Some((name, path)) = spec.split_once('=') else {
        bail!("probe must be `name=image`, got `{spec}`");
    };
    if name.is_empty() || path.is_empty() {
        bail!("probe must be `name=image`, got `{spec}`");
    }
    Ok((name, PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_anchor_spec() {
        let (label, paths) = parse_anchor_spec("anchor=a.jpg, b.jpg").unwrap();
        assert_eq!(label, "anchor");
        assert_eq!(paths, vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")]);
    }

    #[test]
    fn test_parse_anchor_spec_rejects_malformed() {
        assert!(parse_anchor_spec("no-equals").is_err());
        assert!(parse_anchor_spec("=a.jpg").is_err());
        assert!(parse_anchor_spec("label=").is_err());
    }

    #[test]
    fn test_parse_probe_spec() {
        let (name, path) = parse_probe_spec("Alice=probe.png").unwrap();
        assert_eq!(name, "Alice");
        assert_eq!(path, PathBuf::from("probe.png"));
    }

    #[test]
    fn test_parse_probe_spec_rejects_malformed() {
        assert!(parse_probe_spec("Alice").is_err());
        assert!(parse_probe_spec("=probe.png").is_err());
    }
}
