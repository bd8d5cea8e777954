use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::report::SkippedEntry;
use crate::image_pipeline::mosaic::types::{DEFAULT_NODATA, MosaicSource, VirtualMosaic};
use crate::image_pipeline::tiff::GeoTiffReader;

/// Builds a [`VirtualMosaic`] from raster headers alone.
#[derive(Debug, Clone)]
pub struct MosaicIndexBuilder {
    nodata: [f64; 3],
}

impl Default for MosaicIndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NODATA)
    }
}

impl MosaicIndexBuilder {
    pub fn new(nodata: [f64; 3]) -> Self {
        Self { nodata }
    }

    /// Members keep the order of `paths`. Unreadable members are recorded
    /// in [`VirtualMosaic::missing`] rather than failing the build.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    pub fn build(&self, paths: &[PathBuf]) -> Result<VirtualMosaic> {
        if paths.is_empty() {
            return Err(PipelineError::EmptyInput("no rasters to index".to_string()));
        }

        let headers: Vec<_> = paths
            .par_iter()
            .map(|path| (path, GeoTiffReader::read_header(path)))
            .collect();

        let mut sources = Vec::with_capacity(paths.len());
        let mut missing = Vec::new();
        for (path, header) in headers {
            match header {
                Ok(header) => sources.push(MosaicSource {
                    path: path.clone(),
                    bounds: header.bounds,
                    width: header.width,
                    height: header.height,
                    bands: header.bands,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Excluding mosaic member");
                    missing.push(SkippedEntry {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(sources = sources.len(), missing = missing.len(), "Built virtual mosaic");
        Ok(VirtualMosaic {
            sources,
            missing,
            nodata: self.nodata,
        })
    }

    /// Reads one raster path per line; blank lines are ignored and relative
    /// paths resolve against the list file's directory.
    pub fn build_from_list_file(&self, list: &Path) -> Result<VirtualMosaic> {
        let text = std::fs::read_to_string(list)
            .map_err(|e| PipelineError::InputNotFound(format!("{}: {}", list.display(), e)))?;
        let base = list.parent().unwrap_or_else(|| Path::new("."));
        let paths: Vec<PathBuf> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() { path } else { base.join(path) }
            })
            .collect();
        self.build(&paths)
    }
}

/// Writes `paths` one per line, the format [`MosaicIndexBuilder::build_from_list_file`] reads.
pub fn write_list_file(list: &Path, paths: &[PathBuf]) -> Result<()> {
    let output_err = |e: std::io::Error| PipelineError::OutputWriteError(format!("{}: {}", list.display(), e));
    if let Some(parent) = list.parent() {
        std::fs::create_dir_all(parent).map_err(output_err)?;
    }
    let mut file = BufWriter::new(File::create(list).map_err(output_err)?);
    for path in paths {
        writeln!(file, "{}", path.display()).map_err(output_err)?;
    }
    file.flush().map_err(output_err)
}
