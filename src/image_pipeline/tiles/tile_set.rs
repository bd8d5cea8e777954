use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::tiles::coordinate::{TILE_SIZE, TileCoordinate};

/// Bytes in one decoded RGBA tile.
pub const TILE_BYTES: usize = TILE_SIZE * TILE_SIZE * 4;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// RGBA; uncovered pixels are transparent.
    #[default]
    Png,
    /// RGB; uncovered pixels are black.
    Jpeg,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }
}

/// Tiles stored on disk as `{root}/{zoom}/{x}/{y}.{ext}`.
#[derive(Debug, Clone)]
pub struct TileSet {
    root: PathBuf,
    format: TileFormat,
}

impl TileSet {
    pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn tile_path(&self, coord: &TileCoordinate) -> PathBuf {
        self.root.join(coord.relative_path(self.format.extension()))
    }

    pub fn contains(&self, coord: &TileCoordinate) -> bool {
        self.tile_path(coord).is_file()
    }

    /// Encodes an RGBA tile and writes it, creating parent directories.
    pub fn write_tile(&self, coord: &TileCoordinate, rgba: &[u8]) -> Result<PathBuf> {
        if rgba.len() != TILE_BYTES {
            return Err(PipelineError::InvalidShape(format!(
                "tile buffer holds {} bytes, expected {}",
                rgba.len(),
                TILE_BYTES
            )));
        }

        let mut buffer = Vec::new();
        let size = TILE_SIZE as u32;
        let encoded = match self.format {
            TileFormat::Png => PngEncoder::new(&mut buffer).write_image(rgba, size, size, ColorType::Rgba8),
            TileFormat::Jpeg => {
                let rgb: Vec<u8> = rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
                JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode(&rgb, size, size, ColorType::Rgb8)
            }
        };
        encoded.map_err(|e| PipelineError::EncodeError(format!("tile {coord:?}: {e}")))?;

        let path = self.tile_path(coord);
        let output_err = |e: std::io::Error| PipelineError::OutputWriteError(format!("{}: {}", path.display(), e));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(output_err)?;
        }
        std::fs::write(&path, &buffer).map_err(output_err)?;
        Ok(path)
    }

    /// Decoded tile as RGBA. JPEG tiles come back fully opaque.
    pub fn read_tile(&self, coord: &TileCoordinate) -> Result<Vec<u8>> {
        let path = self.tile_path(coord);
        if !path.is_file() {
            return Err(PipelineError::InputNotFound(path.display().to_string()));
        }
        let decoded = image::open(&path)
            .map_err(|e| PipelineError::DecodeError(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        if decoded.width() as usize != TILE_SIZE || decoded.height() as usize != TILE_SIZE {
            return Err(PipelineError::InvalidShape(format!(
                "{}: tile is {}x{}",
                path.display(),
                decoded.width(),
                decoded.height()
            )));
        }
        Ok(decoded.into_raw())
    }

    /// Coordinates present on disk at `zoom`. A missing level is empty.
    pub fn tiles_at(&self, zoom: u8) -> Result<BTreeSet<TileCoordinate>> {
        let level = self.root.join(zoom.to_string());
        let mut found = BTreeSet::new();
        if !level.is_dir() {
            return Ok(found);
        }
        let extension = self.format.extension();
        for column in std::fs::read_dir(&level)? {
            let column = column?;
            let Some(x) = column.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if !column.file_type()?.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(column.path())? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                    continue;
                }
                if let Some(y) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u32>().ok()) {
                    found.insert(TileCoordinate::new(zoom, x, y));
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_tiles_round_trip_with_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = TileSet::new(dir.path(), TileFormat::Png);
        let coord = TileCoordinate::new(20, 5, 7);
        let mut rgba = vec![0u8; TILE_BYTES];
        rgba[..4].copy_from_slice(&[10, 20, 30, 255]);

        let path = tiles.write_tile(&coord, &rgba).unwrap();
        assert!(path.ends_with("20/5/7.png"));
        assert_eq!(tiles.read_tile(&coord).unwrap(), rgba);
        assert_eq!(tiles.tiles_at(20).unwrap().into_iter().collect::<Vec<_>>(), vec![coord]);
        assert!(tiles.tiles_at(19).unwrap().is_empty());
    }

    #[test]
    fn jpeg_tiles_are_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = TileSet::new(dir.path(), TileFormat::Jpeg);
        let coord = TileCoordinate::new(18, 1, 1);
        tiles.write_tile(&coord, &vec![128u8; TILE_BYTES]).unwrap();
        let back = tiles.read_tile(&coord).unwrap();
        assert!(back.chunks_exact(4).all(|p| p[3] == 255));
        assert!(tiles.tile_path(&coord).ends_with("18/1/1.jpg"));
    }

    #[test]
    fn corrupt_tile_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = TileSet::new(dir.path(), TileFormat::Png);
        let coord = TileCoordinate::new(18, 0, 0);
        let path = tiles.tile_path(&coord);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(tiles.read_tile(&coord), Err(PipelineError::DecodeError(_))));
    }
}
