//! Nearest-neighbour sampling of a virtual mosaic onto an output grid.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{trace, warn};

use crate::image_pipeline::geo::{GeoBounds, GeoTransform};
use crate::image_pipeline::mosaic::types::VirtualMosaic;
use crate::image_pipeline::raster::{PixelData, RasterImage};
use crate::image_pipeline::tiff::GeoTiffReader;

#[derive(Default)]
struct CacheState {
    entries: HashMap<usize, Arc<RasterImage>>,
    order: VecDeque<usize>,
    failed: HashSet<usize>,
}

/// Bounded FIFO cache of decoded mosaic members, shared between workers.
pub struct RasterCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl RasterCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Decoded member `index`, or `None` if it cannot be read. A member that
    /// fails once is remembered and never retried.
    pub fn get(&self, mosaic: &VirtualMosaic, index: usize) -> Option<Arc<RasterImage>> {
        {
            let state = self.lock();
            if state.failed.contains(&index) {
                return None;
            }
            if let Some(raster) = state.entries.get(&index) {
                return Some(Arc::clone(raster));
            }
        }

        // decode outside the lock; a concurrent miss may decode twice
        let source = mosaic.sources.get(index)?;
        let loaded = GeoTiffReader::read_raster(&source.path);

        let mut state = self.lock();
        match loaded {
            Ok(raster) => {
                let raster = Arc::new(raster);
                if !state.entries.contains_key(&index) {
                    while state.entries.len() >= self.capacity {
                        let Some(evicted) = state.order.pop_front() else { break };
                        state.entries.remove(&evicted);
                    }
                    state.entries.insert(index, Arc::clone(&raster));
                    state.order.push_back(index);
                }
                Some(raster)
            }
            Err(e) => {
                if state.failed.insert(index) {
                    warn!(path = %source.path.display(), error = %e, "Treating unreadable member as absent");
                }
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // a worker that panicked mid-update leaves a consistent map behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Paints mosaic members onto an RGBA grid. Members are visited in mosaic
/// order so later members overwrite earlier ones; each output pixel takes
/// the member pixel under its center. Pixels whose every band equals the
/// declared nodata stay transparent.
pub struct MosaicSampler<'a> {
    mosaic: &'a VirtualMosaic,
    cache: RasterCache,
}

impl<'a> MosaicSampler<'a> {
    pub fn new(mosaic: &'a VirtualMosaic, cache_capacity: usize) -> Self {
        Self {
            mosaic,
            cache: RasterCache::new(cache_capacity),
        }
    }

    pub fn mosaic(&self) -> &VirtualMosaic {
        self.mosaic
    }

    /// Fills rows `first_row..first_row + rows` of the `cols`-wide grid
    /// described by `grid` into `out` (RGBA, `rows * cols * 4` bytes).
    /// Returns how many pixels received data.
    pub fn render_rgba(&self, grid: &GeoTransform, first_row: usize, rows: usize, cols: usize, out: &mut [u8]) -> usize {
        let Some(window) = window_of(grid, first_row, rows, cols) else {
            return 0;
        };
        let members: Vec<usize> = self.mosaic.sources_in(&window).map(|(i, _)| i).collect();
        self.render_members(&members, grid, first_row, rows, cols, out)
    }

    /// Like [`render_rgba`](Self::render_rgba), restricted to `members`
    /// (mosaic indices in paint order).
    pub fn render_members(
        &self,
        members: &[usize],
        grid: &GeoTransform,
        first_row: usize,
        rows: usize,
        cols: usize,
        out: &mut [u8],
    ) -> usize {
        debug_assert_eq!(out.len(), rows * cols * 4);
        let Some(window) = window_of(grid, first_row, rows, cols) else {
            return 0;
        };
        let x_res = grid.x_res();
        let y_res = grid.y_res();

        let mut covered = 0;
        for &index in members {
            let Some(source) = self.mosaic.sources.get(index) else {
                continue;
            };
            if !source.bounds.intersects(&window) {
                continue;
            }
            let Some(raster) = self.cache.get(self.mosaic, index) else {
                continue;
            };

            // output cells whose centers can fall inside this member, padded by one
            let col_lo = span_start((source.bounds.lng_min - window.lng_min) / x_res, cols);
            let col_hi = span_end((source.bounds.lng_max - window.lng_min) / x_res, cols);
            let row_lo = span_start((window.lat_max - source.bounds.lat_max) / y_res, rows);
            let row_hi = span_end((window.lat_max - source.bounds.lat_min) / y_res, rows);

            for r in row_lo..row_hi {
                let lat = window.lat_max - (r as f64 + 0.5) * y_res;
                for c in col_lo..col_hi {
                    let lng = window.lng_min + (c as f64 + 0.5) * x_res;
                    let Some((sr, sc)) = raster.pixel_at(lat, lng) else {
                        continue;
                    };
                    if let Some(rgb) = sample_rgb(&raster, sr, sc, &self.mosaic.nodata) {
                        let i = (r * cols + c) * 4;
                        if out[i + 3] == 0 {
                            covered += 1;
                        }
                        out[i..i + 3].copy_from_slice(&rgb);
                        out[i + 3] = 255;
                    }
                }
            }
        }
        trace!(first_row, rows, cols, covered, "Sampled mosaic window");
        covered
    }
}

/// Geographic extent of rows `first_row..first_row + rows` of `grid`.
fn window_of(grid: &GeoTransform, first_row: usize, rows: usize, cols: usize) -> Option<GeoBounds> {
    let top = grid.origin_lat() - first_row as f64 * grid.y_res();
    GeoBounds::from_corners(
        top - rows as f64 * grid.y_res(),
        top,
        grid.origin_lng(),
        grid.origin_lng() + cols as f64 * grid.x_res(),
    )
    .ok()
}

fn span_start(offset: f64, len: usize) -> usize {
    if offset <= 1.0 { 0 } else { ((offset - 1.0).floor() as usize).min(len) }
}

fn span_end(offset: f64, len: usize) -> usize {
    if offset <= 0.0 { 0 } else { ((offset + 1.0).ceil() as usize).min(len) }
}

/// RGB at a member pixel, or `None` when it is nodata. Single-band members
/// are replicated to gray, float samples are rounded and clamped to 0..=255.
fn sample_rgb(raster: &RasterImage, row: usize, col: usize, nodata: &[f64; 3]) -> Option<[u8; 3]> {
    let pixels = &raster.pixels;
    let bands = pixels.bands();
    let channel = |k: usize| k.min(bands - 1);

    let is_nodata = (0..bands.min(3)).all(|b| pixels.value(row, col, b) == nodata[b]);
    if is_nodata {
        return None;
    }

    let mut rgb = [0u8; 3];
    match pixels.data() {
        PixelData::U8(data) => {
            let base = (row * pixels.cols() + col) * bands;
            for (k, v) in rgb.iter_mut().enumerate() {
                *v = data[base + channel(k)];
            }
        }
        PixelData::F32(_) => {
            for (k, v) in rgb.iter_mut().enumerate() {
                *v = pixels.value(row, col, channel(k)).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Some(rgb)
}
