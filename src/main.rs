//! colorstack: turn an image into a layered multi-color STL.
//!
//! Set `RUST_LOG` to control log output, e.g. `RUST_LOG=colorstack=debug`.
//! Without it, info logging is on and `-v` / `-vv` raise it to debug / trace.
//!
//! ```bash
//! colorstack logo.png -o logo.stl --bands 4 --width-mm 80
//! colorstack logo.png -o logo.stl --filaments spools.json --preview preview.png --json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use colorstack::{
    export_mesh, generate_palette, process_image, Filament, PipelineSettings,
};

/// Convert an image into a multi-color layered heightfield for 3D printing
#[derive(Parser)]
#[command(name = "colorstack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input image (PNG, JPEG, ...)
    input: PathBuf,

    /// Output STL path
    #[arg(short, long)]
    output: PathBuf,

    /// JSON settings file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of color bands
    #[arg(long)]
    bands: Option<usize>,

    /// Physical X size in mm
    #[arg(long)]
    width_mm: Option<f32>,

    /// Physical Y size in mm (default: keep image aspect ratio)
    #[arg(long)]
    depth_mm: Option<f32>,

    /// Printer layer height in mm
    #[arg(long)]
    layer_height: Option<f32>,

    /// Layers in the base band
    #[arg(long)]
    base_layers: Option<u32>,

    /// Layers added by every band above the base
    #[arg(long)]
    band_layers: Option<u32>,

    /// JSON list of owned filaments to render with
    #[arg(long)]
    filaments: Option<PathBuf>,

    /// Write a composited preview PNG
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Seed for duplicate-color replacement
    #[arg(long)]
    seed: Option<u64>,

    /// Print the palette as JSON
    #[arg(long)]
    json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Summary {
    structural: Vec<String>,
    render: Vec<String>,
    band_counts: Vec<usize>,
    stl_bytes: usize,
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "colorstack=info",
            1 => "colorstack=debug",
            _ => "colorstack=trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn build_settings(cli: &Cli) -> Result<PipelineSettings> {
    let mut settings = match &cli.config {
        Some(path) => PipelineSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => PipelineSettings::default(),
    };

    if let Some(bands) = cli.bands {
        settings.band_count = bands;
    }
    if let Some(width) = cli.width_mm {
        settings.mesh.width_mm = width;
    }
    if cli.depth_mm.is_some() {
        settings.mesh.depth_mm = cli.depth_mm;
    }
    if let Some(height) = cli.layer_height {
        settings.layers.layer_height_mm = height;
    }
    if let Some(layers) = cli.base_layers {
        settings.layers.base_layers = layers;
    }
    if let Some(layers) = cli.band_layers {
        settings.layers.band_layers = layers;
    }
    if cli.seed.is_some() {
        settings.palette.seed = cli.seed;
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn load_inventory(path: &Path) -> Result<Vec<Filament>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse filament list {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = build_settings(&cli)?;
    let img = image::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?
        .to_rgba8();
    info!(width = img.width(), height = img.height(), "Loaded image");

    let mut state = generate_palette(&img, settings.band_count, &settings.palette)?;
    if let Some(path) = &cli.filaments {
        let inventory = load_inventory(path)?;
        state.apply_filaments(&inventory);
    }

    let processed = process_image(&img, &state, &settings.preview)?;
    let stl = export_mesh(&processed.raster, state.len(), &settings.layers, &settings.mesh)?;

    fs::write(&cli.output, &stl)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    if let Some(path) = &cli.preview {
        processed
            .preview
            .save(path)
            .with_context(|| format!("Failed to write preview {}", path.display()))?;
    }

    let summary = Summary {
        structural: state.structural_hex(),
        render: state.render_hex(),
        band_counts: processed.raster.counts(state.len()),
        stl_bytes: stl.len(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Wrote {} ({} bytes)", cli.output.display(), summary.stl_bytes);
        for (band, (structural, render)) in
            summary.structural.iter().zip(&summary.render).enumerate()
        {
            println!(
                "  band {:>2}: {} -> {}  ({} px)",
                band, structural, render, summary.band_counts[band]
            );
        }
    }

    Ok(())
}
