//! Geodetic (EPSG:4326) tile grid in TMS numbering.
//!
//! Zoom `z` has square pixels of `360 / 256 / 2^z` degrees, tile (0, 0) sits
//! at (-180, -90) and `y` grows northwards.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::image_pipeline::geo::{GeoBounds, GeoTransform};

/// Tile edge length in pixels.
pub const TILE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Degrees per pixel at `zoom`.
    pub fn resolution(zoom: u8) -> f64 {
        360.0 / TILE_SIZE as f64 / 2f64.powi(zoom as i32)
    }

    fn span(zoom: u8) -> f64 {
        Self::resolution(zoom) * TILE_SIZE as f64
    }

    pub fn bounds(&self) -> GeoBounds {
        let span = Self::span(self.zoom);
        GeoBounds {
            lat_min: -90.0 + self.y as f64 * span,
            lat_max: -90.0 + (self.y + 1) as f64 * span,
            lng_min: -180.0 + self.x as f64 * span,
            lng_max: -180.0 + (self.x + 1) as f64 * span,
        }
    }

    /// Pixel grid of this tile, row 0 at the north edge.
    pub fn geotransform(&self) -> GeoTransform {
        let b = self.bounds();
        let res = Self::resolution(self.zoom);
        GeoTransform([b.lng_min, res, 0.0, b.lat_max, 0.0, -res])
    }

    pub fn parent(&self) -> Option<TileCoordinate> {
        (self.zoom > 0).then(|| TileCoordinate::new(self.zoom - 1, self.x / 2, self.y / 2))
    }

    /// Children at `zoom + 1` as [top-left, top-right, bottom-left, bottom-right].
    pub fn children(&self) -> [TileCoordinate; 4] {
        let (z, x, y) = (self.zoom + 1, self.x * 2, self.y * 2);
        [
            TileCoordinate::new(z, x, y + 1),
            TileCoordinate::new(z, x + 1, y + 1),
            TileCoordinate::new(z, x, y),
            TileCoordinate::new(z, x + 1, y),
        ]
    }

    /// Tiles at `zoom` whose interior overlaps `bounds`, as (x range, y range).
    pub fn range_for(bounds: &GeoBounds, zoom: u8) -> (RangeInclusive<u32>, RangeInclusive<u32>) {
        let span = Self::span(zoom);
        let index = |offset: f64| (offset / span).max(0.0);
        let x_min = index(bounds.lng_min + 180.0).floor() as u32;
        let x_max = (index(bounds.lng_max + 180.0).ceil() as u32).saturating_sub(1).max(x_min);
        let y_min = index(bounds.lat_min + 90.0).floor() as u32;
        let y_max = (index(bounds.lat_max + 90.0).ceil() as u32).saturating_sub(1).max(y_min);
        (x_min..=x_max, y_min..=y_max)
    }

    /// `{zoom}/{x}/{y}.{extension}` below a tile root.
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        PathBuf::from(self.zoom.to_string())
            .join(self.x.to_string())
            .join(format!("{}.{}", self.y, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_tile_their_parent() {
        let parent = TileCoordinate::new(20, 100, 300);
        let pb = parent.bounds();
        let [tl, tr, bl, br] = parent.children();
        assert_eq!(tl.bounds().lat_max, pb.lat_max);
        assert_eq!(tl.bounds().lng_min, pb.lng_min);
        assert_eq!(tr.bounds().lng_max, pb.lng_max);
        assert_eq!(bl.bounds().lat_min, pb.lat_min);
        assert_eq!(br.bounds().lng_max, pb.lng_max);
        for child in parent.children() {
            assert_eq!(child.parent(), Some(parent));
        }
        assert_eq!(TileCoordinate::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn range_covers_field_without_touching_neighbours() {
        let tile = TileCoordinate::new(22, 1000, 2000);
        let (xs, ys) = TileCoordinate::range_for(&tile.bounds(), 22);
        assert_eq!((xs, ys), (1000..=1000, 2000..=2000));

        let field = GeoBounds::from_corners(33.0745861, 33.0764277, -111.9750277, -111.9748097).unwrap();
        let (xs, ys) = TileCoordinate::range_for(&field, 18);
        for x in xs.clone() {
            for y in ys.clone() {
                assert!(TileCoordinate::new(18, x, y).bounds().intersects(&field));
            }
        }
    }

    #[test]
    fn resolution_halves_per_level() {
        assert_eq!(TileCoordinate::resolution(0), 360.0 / 256.0);
        assert_eq!(TileCoordinate::resolution(1) * 2.0, TileCoordinate::resolution(0));
        let path = TileCoordinate::new(28, 7, 9).relative_path("png");
        assert_eq!(path, PathBuf::from("28/7/9.png"));
    }
}
