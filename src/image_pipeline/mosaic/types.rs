//! Virtual mosaic: an ordered set of raster references, never their pixels.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::report::SkippedEntry;
use crate::image_pipeline::geo::GeoBounds;

/// NoData triple declared for every band of every mosaic member.
pub const DEFAULT_NODATA: [f64; 3] = [-99.0, -99.0, -99.0];

/// One member raster of a mosaic and its footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicSource {
    pub path: PathBuf,
    pub bounds: GeoBounds,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
}

impl MosaicSource {
    pub fn x_res(&self) -> f64 {
        self.bounds.lng_span() / self.width as f64
    }

    pub fn y_res(&self) -> f64 {
        self.bounds.lat_span() / self.height as f64
    }
}

/// Sources are painted in order, so later members win where they overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMosaic {
    pub sources: Vec<MosaicSource>,
    /// Listed members that could not be opened; excluded from rendering.
    pub missing: Vec<SkippedEntry>,
    pub nodata: [f64; 3],
}

impl VirtualMosaic {
    pub fn skip_count(&self) -> usize {
        self.missing.len()
    }

    /// Union of all member footprints, `None` for a mosaic with no readable member.
    pub fn extent(&self) -> Option<GeoBounds> {
        self.sources
            .iter()
            .map(|s| s.bounds)
            .reduce(|acc, b| acc.union(&b))
    }

    /// Smallest member pixel size as (x, y) degrees.
    pub fn finest_resolution(&self) -> Option<(f64, f64)> {
        self.sources.iter().map(|s| (s.x_res(), s.y_res())).reduce(|(ax, ay), (bx, by)| {
            (ax.min(bx), ay.min(by))
        })
    }

    /// Members whose footprint overlaps `window`, in paint order.
    pub fn sources_in<'a>(&'a self, window: &'a GeoBounds) -> impl Iterator<Item = (usize, &'a MosaicSource)> + 'a {
        self.sources
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.bounds.intersects(window))
    }

    pub fn save_manifest(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e)))?;
        let output_err = |e: String| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e));
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| output_err(e.to_string()))?;
        writer.flush().map_err(|e| output_err(e.to_string()))
    }

    pub fn load_manifest(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", path.display(), e)))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PipelineError::DecodeError(format!("{}: {}", path.display(), e)))
    }
}
