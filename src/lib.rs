pub mod background;
pub mod bands;
pub mod color;
pub mod error;
pub mod filament;
pub mod mesh;
pub mod palette;
pub mod pipeline;
pub mod saliency;
pub mod settings;
pub mod worker;

pub use bands::BandRaster;
pub use color::{Color, Lab};
pub use error::{ColorStackError, Result};
pub use filament::Filament;
pub use pipeline::{export_mesh, generate_palette, process_image, PaletteState, ProcessedImage};
pub use settings::{
    LayerSettings, MeshSettings, PaletteSettings, PipelineSettings, PreviewMode, PreviewSettings,
};
pub use worker::{spawn_worker, Request, Response, WorkerHandle};

use std::path::PathBuf;

/// Full pipeline for an image on disk, run on the blocking pool.
///
/// Returns the palette state and STL bytes. Render colors are matched to
/// `inventory` when it is non-empty.
pub async fn image_to_stl(
    input_path: PathBuf,
    settings: PipelineSettings,
    inventory: Vec<Filament>,
) -> Result<(PaletteState, Vec<u8>)> {
    tokio::task::spawn_blocking(move || {
        settings.validate()?;
        let img = image::open(&input_path)?.to_rgba8();

        let mut state = generate_palette(&img, settings.band_count, &settings.palette)?;
        state.apply_filaments(&inventory);

        let processed = process_image(&img, &state, &settings.preview)?;
        let stl = export_mesh(&processed.raster, state.len(), &settings.layers, &settings.mesh)?;
        Ok((state, stl))
    })
    .await
    .map_err(|e| ColorStackError::Processing(format!("Task join error: {}", e)))?
}
