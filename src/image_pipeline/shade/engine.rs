use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::report::BatchReport;
use crate::image_pipeline::mosaic::MosaicIndexBuilder;
use crate::image_pipeline::raw::SensorSide;
use crate::image_pipeline::shade::darker::merge_rgba;
use crate::image_pipeline::shade::split::SplitAssignment;
use crate::image_pipeline::tiles::{TileCoordinate, TilePyramidBuilder, TileFormat, TileSet};

/// Directory holding the merged pyramid, next to the per-group directories.
pub const MERGED_DIR: &str = "unite";

/// Builds one base-level tile set per round-robin split of the frames and
/// fuses them with the darker-pixel rule.
///
/// Output layout under `root`:
///
/// ```text
/// {root}/{group}/tif_list.txt
/// {root}/{group}/tiles_{side}/{z}/{x}/{y}.{ext}
/// {root}/unite/tiles_{side}/{z}/{x}/{y}.{ext}
/// ```
#[derive(Debug, Clone)]
pub struct ShadeMergeEngine {
    split_count: usize,
    side: SensorSide,
    format: TileFormat,
    pyramid: TilePyramidBuilder,
    index_builder: MosaicIndexBuilder,
}

impl ShadeMergeEngine {
    pub fn new(split_count: usize, side: SensorSide, format: TileFormat, pyramid: TilePyramidBuilder) -> Result<Self> {
        if split_count == 0 {
            return Err(PipelineError::InvalidConfig("split count must be at least 1".to_string()));
        }
        Ok(Self {
            split_count,
            side,
            format,
            pyramid,
            index_builder: MosaicIndexBuilder::default(),
        })
    }

    pub fn with_index_builder(mut self, index_builder: MosaicIndexBuilder) -> Self {
        self.index_builder = index_builder;
        self
    }

    fn tiles_dir(&self, base: &Path) -> PathBuf {
        base.join(format!("tiles_{}", self.side))
    }

    /// Tile set of one group.
    pub fn group_tiles(&self, root: &Path, group: usize) -> TileSet {
        TileSet::new(self.tiles_dir(&root.join(group.to_string())), self.format)
    }

    /// The merged tile set.
    pub fn merged_tiles(&self, root: &Path) -> TileSet {
        TileSet::new(self.tiles_dir(&root.join(MERGED_DIR)), self.format)
    }

    #[instrument(skip(self, frames), fields(frames = frames.len(), splits = self.split_count))]
    pub fn run(&self, frames: &[PathBuf], root: &Path) -> Result<BatchReport> {
        if frames.is_empty() {
            return Err(PipelineError::EmptyInput("no frames to split".to_string()));
        }
        let split = SplitAssignment::round_robin(frames, self.split_count)?;
        split.write_lists(root)?;

        let mut report = BatchReport::new();
        let mut group_sets = Vec::with_capacity(split.group_count());
        for (id, group) in split.groups().iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let tiles = self.group_tiles(root, id);
            let _span = tracing::info_span!("split", group = id, frames = group.len()).entered();
            let mosaic = self.index_builder.build(group)?;
            report.skipped += mosaic.skip_count();
            report.skipped_entries.extend(mosaic.missing.iter().cloned());
            match self.pyramid.render_base(&mosaic, &tiles) {
                Ok(group_report) => report.merge(group_report),
                Err(PipelineError::EmptyInput(reason)) => {
                    warn!(group = id, %reason, "Split produced no tiles");
                    continue;
                }
                Err(e) => return Err(e),
            }
            group_sets.push(tiles);
        }

        let merged = self.merged_tiles(root);
        report.merge(self.merge_base(&group_sets, &merged)?);
        // overviews always follow the freshly merged base
        report.merge(self.pyramid.clone().overwrite(true).build_overviews(&merged)?);
        info!(
            tiles = report.processed,
            skipped = report.skipped,
            root = %merged.root().display(),
            "Shade merge complete"
        );
        Ok(report)
    }

    /// Fuses the base level of every group into `merged`. Tiles present in a
    /// single group are copied verbatim.
    pub fn merge_base(&self, groups: &[TileSet], merged: &TileSet) -> Result<BatchReport> {
        let zoom = self.pyramid.max_zoom();
        let mut candidates: BTreeMap<TileCoordinate, Vec<&TileSet>> = BTreeMap::new();
        for tiles in groups {
            for coord in tiles.tiles_at(zoom)? {
                candidates.entry(coord).or_default().push(tiles);
            }
        }
        if candidates.is_empty() {
            return Err(PipelineError::EmptyInput(format!("no base tiles at zoom {zoom}")));
        }
        let shared = candidates.values().filter(|sets| sets.len() > 1).count();
        info!(tiles = candidates.len(), shared, "Merging base tiles");

        let results: Vec<_> = candidates
            .par_iter()
            .map(|(coord, sets)| (*coord, merge_tile(coord, sets, merged)))
            .collect();

        let mut report = BatchReport::new();
        for (coord, result) in results {
            match result {
                Ok(path) => report.record_output(&path),
                Err(e) if e.is_unit_local() => {
                    warn!(tile = ?coord, error = %e, "Skipping merged tile");
                    report.record_skip(merged.tile_path(&coord), &e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

fn merge_tile(coord: &TileCoordinate, sets: &[&TileSet], merged: &TileSet) -> Result<PathBuf> {
    let target = merged.tile_path(coord);
    if let [only] = sets {
        return copy_tile(&only.tile_path(coord), &target);
    }

    let readable: Vec<Vec<u8>> = sets
        .iter()
        .filter_map(|tiles| {
            tiles
                .read_tile(coord)
                .map_err(|e| warn!(tile = ?coord, error = %e, "Treating undecodable candidate as absent"))
                .ok()
        })
        .collect();
    if readable.is_empty() {
        return Err(PipelineError::DecodeError(format!("no readable candidate for tile {coord:?}")));
    }
    merged.write_tile(coord, &merge_rgba(&readable))
}

fn copy_tile(source: &Path, target: &Path) -> Result<PathBuf> {
    let output_err = |e: std::io::Error| PipelineError::OutputWriteError(format!("{}: {}", target.display(), e));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(output_err)?;
    }
    std::fs::copy(source, target).map_err(output_err)?;
    Ok(target.to_path_buf())
}
