use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::report::BatchReport;
use crate::image_pipeline::mosaic::{MosaicSampler, VirtualMosaic};
use crate::image_pipeline::tiles::coordinate::{TILE_SIZE, TileCoordinate};
use crate::image_pipeline::tiles::tile_set::{TILE_BYTES, TileSet};

/// Deepest zoom the geodetic grid supports without overflowing tile indices.
const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Progress of a pyramid build. Overview levels complete in descending zoom order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyramidState {
    NotStarted,
    BaseRendered,
    Overview(u8),
    Done,
}

impl PyramidState {
    /// The state reached after the next unit of work.
    pub fn next(self, min_zoom: u8, max_zoom: u8) -> PyramidState {
        match self {
            PyramidState::NotStarted => PyramidState::BaseRendered,
            PyramidState::BaseRendered if max_zoom > min_zoom => PyramidState::Overview(max_zoom - 1),
            PyramidState::Overview(z) if z > min_zoom => PyramidState::Overview(z - 1),
            _ => PyramidState::Done,
        }
    }
}

enum TileOutcome {
    Written(PathBuf),
    Reused,
    Empty,
}

fn fold_outcomes(results: Vec<(TileCoordinate, Result<TileOutcome>)>, tiles: &TileSet) -> Result<BatchReport> {
    let mut report = BatchReport::new();
    for (coord, result) in results {
        match result {
            Ok(TileOutcome::Written(path)) => report.record_output(&path),
            Ok(TileOutcome::Reused) => report.record_reused(),
            Ok(TileOutcome::Empty) => {}
            Err(e) if e.is_unit_local() => {
                warn!(tile = ?coord, error = %e, "Skipping tile");
                report.record_skip(tiles.tile_path(&coord), &e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

/// Renders a virtual mosaic into a sparse tile pyramid.
#[derive(Debug, Clone)]
pub struct TilePyramidBuilder {
    min_zoom: u8,
    max_zoom: u8,
    overwrite: bool,
    cache_capacity: usize,
}

impl TilePyramidBuilder {
    pub fn new(min_zoom: u8, max_zoom: u8) -> Result<Self> {
        if min_zoom > max_zoom || max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(PipelineError::InvalidConfig(format!(
                "zoom range {min_zoom}-{max_zoom} (maximum {MAX_SUPPORTED_ZOOM})"
            )));
        }
        Ok(Self {
            min_zoom,
            max_zoom,
            overwrite: false,
            cache_capacity: 64,
        })
    }

    /// Re-render tiles that already exist on disk.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Base level followed by every overview level.
    #[instrument(skip(self, mosaic, tiles), fields(root = %tiles.root().display()))]
    pub fn build(&self, mosaic: &VirtualMosaic, tiles: &TileSet) -> Result<BatchReport> {
        let mut report = BatchReport::new();
        let mut state = PyramidState::NotStarted;
        while state != PyramidState::Done {
            let next = state.next(self.min_zoom, self.max_zoom);
            match next {
                PyramidState::BaseRendered => report.merge(self.render_base(mosaic, tiles)?),
                PyramidState::Overview(zoom) => report.merge(self.build_overview_level(tiles, zoom)?),
                PyramidState::NotStarted | PyramidState::Done => {}
            }
            debug!(state = ?next, "Pyramid progress");
            state = next;
        }
        info!(
            tiles = report.processed,
            reused = report.reused,
            skipped = report.skipped,
            "Tile pyramid complete"
        );
        Ok(report)
    }

    /// Renders every base-level tile that any mosaic member touches.
    /// Tiles without a single covered pixel are not written.
    pub fn render_base(&self, mosaic: &VirtualMosaic, tiles: &TileSet) -> Result<BatchReport> {
        let _span = tracing::info_span!("render_base", zoom = self.max_zoom).entered();
        if mosaic.sources.is_empty() {
            return Err(PipelineError::EmptyInput("mosaic has no readable members".to_string()));
        }

        // tile -> members touching it, in paint order
        let mut index: BTreeMap<TileCoordinate, Vec<usize>> = BTreeMap::new();
        for (i, source) in mosaic.sources.iter().enumerate() {
            let (xs, ys) = TileCoordinate::range_for(&source.bounds, self.max_zoom);
            for x in xs {
                for y in ys.clone() {
                    index.entry(TileCoordinate::new(self.max_zoom, x, y)).or_default().push(i);
                }
            }
        }
        info!(candidates = index.len(), "Rendering base tiles");

        let sampler = MosaicSampler::new(mosaic, self.cache_capacity);
        let results: Vec<_> = index
            .par_iter()
            .map(|(coord, members)| (*coord, self.render_tile(&sampler, tiles, coord, members)))
            .collect();
        fold_outcomes(results, tiles)
    }

    fn render_tile(
        &self,
        sampler: &MosaicSampler<'_>,
        tiles: &TileSet,
        coord: &TileCoordinate,
        members: &[usize],
    ) -> Result<TileOutcome> {
        if !self.overwrite && tiles.contains(coord) {
            return Ok(TileOutcome::Reused);
        }
        let mut rgba = vec![0u8; TILE_BYTES];
        let covered = sampler.render_members(members, &coord.geotransform(), 0, TILE_SIZE, TILE_SIZE, &mut rgba);
        if covered == 0 {
            return Ok(TileOutcome::Empty);
        }
        tiles.write_tile(coord, &rgba).map(TileOutcome::Written)
    }

    /// Regenerates all overview levels from the base level already on disk.
    pub fn build_overviews(&self, tiles: &TileSet) -> Result<BatchReport> {
        let mut report = BatchReport::new();
        let mut state = PyramidState::BaseRendered;
        loop {
            state = state.next(self.min_zoom, self.max_zoom);
            let PyramidState::Overview(zoom) = state else { break };
            report.merge(self.build_overview_level(tiles, zoom)?);
        }
        Ok(report)
    }

    /// Builds level `zoom` from level `zoom + 1`, which must be complete.
    fn build_overview_level(&self, tiles: &TileSet, zoom: u8) -> Result<BatchReport> {
        let _span = tracing::info_span!("overview", zoom).entered();
        let parents: BTreeSet<TileCoordinate> = tiles
            .tiles_at(zoom + 1)?
            .iter()
            .filter_map(TileCoordinate::parent)
            .collect();
        debug!(tiles = parents.len(), "Reducing level");

        let results: Vec<_> = parents
            .par_iter()
            .map(|parent| (*parent, self.reduce_tile(tiles, parent)))
            .collect();
        fold_outcomes(results, tiles)
    }

    fn reduce_tile(&self, tiles: &TileSet, parent: &TileCoordinate) -> Result<TileOutcome> {
        if !self.overwrite && tiles.contains(parent) {
            return Ok(TileOutcome::Reused);
        }
        let children = parent.children().map(|child| {
            if !tiles.contains(&child) {
                return None;
            }
            tiles
                .read_tile(&child)
                .map_err(|e| warn!(tile = ?child, error = %e, "Ignoring unreadable child tile"))
                .ok()
        });
        if children.iter().all(Option::is_none) {
            return Ok(TileOutcome::Empty);
        }
        let rgba = downsample_quad(&children);
        tiles.write_tile(parent, &rgba).map(TileOutcome::Written)
    }
}

/// 2x2 box reduction of four child tiles, laid out [top-left, top-right,
/// bottom-left, bottom-right], into one parent tile. Only opaque child pixels
/// contribute; a parent pixel with none stays transparent.
pub fn downsample_quad(children: &[Option<Vec<u8>>; 4]) -> Vec<u8> {
    let half = TILE_SIZE / 2;
    let mut out = vec![0u8; TILE_BYTES];
    for (quadrant, child) in children.iter().enumerate() {
        let Some(child) = child else { continue };
        let row_offset = (quadrant / 2) * half;
        let col_offset = (quadrant % 2) * half;
        for r in 0..half {
            for c in 0..half {
                let mut sum = [0u32; 3];
                let mut n = 0u32;
                for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let i = ((2 * r + dr) * TILE_SIZE + 2 * c + dc) * 4;
                    if child[i + 3] > 0 {
                        for k in 0..3 {
                            sum[k] += child[i + k] as u32;
                        }
                        n += 1;
                    }
                }
                if n == 0 {
                    continue;
                }
                let o = ((row_offset + r) * TILE_SIZE + col_offset + c) * 4;
                for k in 0..3 {
                    out[o + k] = ((sum[k] + n / 2) / n) as u8;
                }
                out[o + 3] = 255;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::geo::GeoBounds;
    use crate::image_pipeline::mosaic::MosaicIndexBuilder;
    use crate::image_pipeline::raster::{PixelBuffer, PixelData, RasterImage};
    use crate::image_pipeline::tiff::{GeoTiffWriter, RasterWriteOptions, write_raster_file};
    use crate::image_pipeline::tiles::tile_set::TileFormat;

    #[test]
    fn state_machine_descends_through_overviews() {
        let mut state = PyramidState::NotStarted;
        let mut seen = Vec::new();
        while state != PyramidState::Done {
            state = state.next(18, 20);
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                PyramidState::BaseRendered,
                PyramidState::Overview(19),
                PyramidState::Overview(18),
                PyramidState::Done
            ]
        );
        assert_eq!(PyramidState::BaseRendered.next(20, 20), PyramidState::Done);
    }

    #[test]
    fn invalid_zoom_range_is_rejected() {
        assert!(matches!(TilePyramidBuilder::new(20, 18), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn downsample_averages_only_opaque_pixels() {
        let mut tl = vec![0u8; TILE_BYTES];
        tl[..4].copy_from_slice(&[100, 0, 0, 255]);
        tl[4..8].copy_from_slice(&[201, 0, 0, 255]);
        let br = [50u8, 60, 70, 255].repeat(TILE_SIZE * TILE_SIZE);

        let out = downsample_quad(&[Some(tl), None, None, Some(br)]);
        assert_eq!(&out[..4], &[151, 0, 0, 255]);
        // second parent pixel of the first row comes from fully transparent child pixels
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        let last = TILE_BYTES - 4;
        assert_eq!(&out[last..], &[50, 60, 70, 255]);
        // top-right quadrant has no child
        let tr = (TILE_SIZE - 1) * 4;
        assert_eq!(&out[tr..tr + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn pyramid_is_sparse_and_overviews_follow_children() {
        let dir = tempfile::tempdir().unwrap();
        let zoom = 20;
        // one raster covering exactly the left half of a single base tile
        let base = TileCoordinate::new(zoom, 200_000, 350_000);
        let tb = base.bounds();
        let half = TILE_SIZE / 2;
        let bounds = GeoBounds::from_corners(tb.lat_min, tb.lat_max, tb.lng_min, tb.lng_min + tb.lng_span() / 2.0).unwrap();
        let pixels = PixelBuffer::from_shape(&[TILE_SIZE, half, 3], PixelData::U8(vec![80; TILE_SIZE * half * 3])).unwrap();
        let path = dir.path().join("frame.tif");
        write_raster_file(&GeoTiffWriter, &RasterImage::new(pixels, bounds).unwrap(), &path, &RasterWriteOptions::default()).unwrap();
        let mosaic = MosaicIndexBuilder::default().build(&[path]).unwrap();

        let tiles = TileSet::new(dir.path().join("tiles"), TileFormat::Png);
        let report = TilePyramidBuilder::new(zoom - 2, zoom).unwrap().build(&mosaic, &tiles).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(tiles.tiles_at(zoom).unwrap().len(), 1);

        let base_tile = tiles.read_tile(&base).unwrap();
        assert_eq!(&base_tile[..4], &[80, 80, 80, 255]);
        let right = (TILE_SIZE - 1) * 4;
        assert_eq!(base_tile[right + 3], 0);

        let parent = base.parent().unwrap();
        let quadrant = parent.children().iter().position(|c| *c == base).unwrap();
        let expected = downsample_quad(&std::array::from_fn(|i| (i == quadrant).then(|| base_tile.clone())));
        assert_eq!(tiles.read_tile(&parent).unwrap(), expected);

        // resume: a second run reuses everything
        let again = TilePyramidBuilder::new(zoom - 2, zoom).unwrap().build(&mosaic, &tiles).unwrap();
        assert_eq!((again.processed, again.reused), (0, 3));
    }
}
