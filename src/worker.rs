//! Worker/Coordinator boundary
//!
//! Runs the pipeline off the caller's thread. The caller sends one-shot
//! requests and gets one response per request:
//!
//! - `Init` - handshake, reports version and band limits
//! - `GeneratePalette` - pixels + band count -> palette state
//! - `ProcessImage` - pixels + palette state -> band raster + preview pixels
//! - `ExportMesh` - band raster + layer/mesh settings -> STL bytes
//!
//! Requests run one at a time in issue order. There is no cancellation; a
//! newer request only makes older responses stale. Every request carries a
//! token and `WorkerHandle` rejects any response whose token is no longer the
//! latest with `ColorStackError::Superseded`.
//!
//! Buffers move into the worker by value, nothing is shared mutably.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use crate::bands::BandRaster;
use crate::error::{Result, ColorStackError};
use crate::pipeline::{export_mesh, generate_palette, image_from_rgba, process_image, PaletteState};
use crate::settings::{LayerSettings, MeshSettings, PaletteSettings, PreviewSettings, MAX_BANDS, MIN_BANDS};

/// Jobs that may wait behind the one in flight
const QUEUE_DEPTH: usize = 16;

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Init,
    GeneratePalette {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        band_count: usize,
    },
    ProcessImage {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        palette: PaletteState,
        #[serde(default)]
        preview: PreviewSettings,
    },
    ExportMesh {
        raster: BandRaster,
        band_count: usize,
        layers: LayerSettings,
        mesh: MeshSettings,
    },
}

impl Request {
    fn kind(&self) -> &'static str {
        match self {
            Request::Init => "init",
            Request::GeneratePalette { .. } => "generate_palette",
            Request::ProcessImage { .. } => "process_image",
            Request::ExportMesh { .. } => "export_mesh",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ready {
        version: String,
        min_bands: usize,
        max_bands: usize,
    },
    Palette {
        palette: PaletteState,
    },
    Processed {
        raster: BandRaster,
        /// RGBA preview, same dimensions as the raster
        preview: Vec<u8>,
    },
    Mesh {
        stl: Vec<u8>,
    },
    Failed {
        error: ColorStackError,
    },
}

/// Run one request to completion on the current thread
pub fn handle_request(request: Request, settings: &PaletteSettings) -> Response {
    match run_request(request, settings) {
        Ok(response) => response,
        Err(error) => Response::Failed { error },
    }
}

fn run_request(request: Request, settings: &PaletteSettings) -> Result<Response> {
    match request {
        Request::Init => Ok(Response::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
            min_bands: MIN_BANDS,
            max_bands: MAX_BANDS,
        }),
        Request::GeneratePalette { pixels, width, height, band_count } => {
            let img = image_from_rgba(pixels, width, height)?;
            let palette = generate_palette(&img, band_count, settings)?;
            Ok(Response::Palette { palette })
        }
        Request::ProcessImage { pixels, width, height, palette, preview } => {
            let img = image_from_rgba(pixels, width, height)?;
            let processed = process_image(&img, &palette, &preview)?;
            Ok(Response::Processed {
                raster: processed.raster,
                preview: processed.preview.into_raw(),
            })
        }
        Request::ExportMesh { raster, band_count, layers, mesh } => {
            let stl = export_mesh(&raster, band_count, &layers, &mesh)?;
            Ok(Response::Mesh { stl })
        }
    }
}

// ============================================================================
// BACKGROUND WORKER
// ============================================================================

struct Job {
    token: u64,
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Caller side of a running worker. Dropping it stops the worker.
pub struct WorkerHandle {
    jobs: mpsc::Sender<Job>,
    next_token: AtomicU64,
    latest: AtomicU64,
}

/// Start a worker task. Must be called from within a Tokio runtime.
pub fn spawn_worker(settings: PaletteSettings) -> WorkerHandle {
    let (jobs, mut queue) = mpsc::channel::<Job>(QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(Job { token, request, reply }) = queue.recv().await {
            let kind = request.kind();
            let settings = settings.clone();

            let response = tokio::task::spawn_blocking(move || handle_request(request, &settings))
                .await
                .unwrap_or_else(|e| Response::Failed {
                    error: ColorStackError::Processing(format!("Task join error: {}", e)),
                });

            debug!(token, kind, "Finished request");
            // Caller may have gone away; nothing to do then
            let _ = reply.send(response);
        }
        debug!("Worker queue closed");
    });

    WorkerHandle {
        jobs,
        next_token: AtomicU64::new(0),
        latest: AtomicU64::new(0),
    }
}

impl WorkerHandle {
    /// Send a request and wait for its response.
    ///
    /// Fails with `Superseded` if another request was issued on this handle
    /// before the response arrived.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.fetch_max(token, Ordering::SeqCst);

        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Job { token, request, reply })
            .await
            .map_err(|_| ColorStackError::WorkerClosed)?;
        let response = response.await.map_err(|_| ColorStackError::WorkerClosed)?;

        let latest = self.latest.load(Ordering::SeqCst);
        if latest != token {
            warn!(token, latest, "Discarding stale response");
            return Err(ColorStackError::Superseded { token, latest });
        }
        Ok(response)
    }

    pub async fn init(&self) -> Result<String> {
        match self.request(Request::Init).await? {
            Response::Ready { version, .. } => Ok(version),
            other => unexpected(other),
        }
    }

    pub async fn generate_palette(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        band_count: usize,
    ) -> Result<PaletteState> {
        let request = Request::GeneratePalette { pixels, width, height, band_count };
        match self.request(request).await? {
            Response::Palette { palette } => Ok(palette),
            other => unexpected(other),
        }
    }

    pub async fn process_image(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        palette: PaletteState,
        preview: PreviewSettings,
    ) -> Result<(BandRaster, Vec<u8>)> {
        let request = Request::ProcessImage { pixels, width, height, palette, preview };
        match self.request(request).await? {
            Response::Processed { raster, preview } => Ok((raster, preview)),
            other => unexpected(other),
        }
    }

    pub async fn export_mesh(
        &self,
        raster: BandRaster,
        band_count: usize,
        layers: LayerSettings,
        mesh: MeshSettings,
    ) -> Result<Vec<u8>> {
        let request = Request::ExportMesh { raster, band_count, layers, mesh };
        match self.request(request).await? {
            Response::Mesh { stl } => Ok(stl),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(response: Response) -> Result<T> {
    match response {
        Response::Failed { error } => Err(error),
        other => Err(ColorStackError::Processing(format!(
            "unexpected response: {}",
            serde_json::to_value(&other)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                .unwrap_or_default()
        ))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
