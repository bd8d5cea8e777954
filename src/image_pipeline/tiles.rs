//! Tile pyramids: geodetic tile grid, on-disk tile sets and the builder
//! that renders a mosaic into them.

pub mod coordinate;
mod pyramid;
mod tile_set;

pub use coordinate::{TILE_SIZE, TileCoordinate};
pub use pyramid::{PyramidState, TilePyramidBuilder, downsample_quad};
pub use tile_set::{TILE_BYTES, TileFormat, TileSet};
