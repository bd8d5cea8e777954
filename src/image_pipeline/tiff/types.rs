//! GeoTIFF writing configuration types

use std::collections::BTreeMap;

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

impl TiffCompression {
    pub(crate) fn to_tiff(self) -> tiff::encoder::Compression {
        use tiff::encoder::Compression;
        use tiff::encoder::compression::DeflateLevel;
        match self {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        }
    }

    /// Compressor for data written outside `ImageEncoder::write_data`.
    pub(crate) fn compressor(self) -> tiff::encoder::compression::Compressor {
        use tiff::encoder::compression::{Compressor, Deflate, DeflateLevel, Lzw, Uncompressed};
        match self {
            TiffCompression::None => Compressor::Uncompressed(Uncompressed),
            TiffCompression::Lzw => Compressor::Lzw(Lzw),
            TiffCompression::DeflateFast => Compressor::Deflate(Deflate::with_level(DeflateLevel::Fast)),
            TiffCompression::DeflateBalanced => Compressor::Deflate(Deflate::with_level(DeflateLevel::Balanced)),
            TiffCompression::DeflateBest => Compressor::Deflate(Deflate::with_level(DeflateLevel::Best)),
        }
    }

    pub(crate) fn method(self) -> tiff::tags::CompressionMethod {
        use tiff::tags::CompressionMethod;
        match self {
            TiffCompression::None => CompressionMethod::None,
            TiffCompression::Lzw => CompressionMethod::LZW,
            _ => CompressionMethod::Deflate,
        }
    }
}

/// Per-file options for georeferenced raster output
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWriteOptions {
    /// Compression method to use
    pub compression: TiffCompression,
    /// Predictor value for compression (2 for horizontal differencing).
    /// Only applied to 8-bit samples.
    pub predictor: Option<u16>,
    /// Declared nodata value, written to every band
    pub nodata: Option<f64>,
    /// Store samples as 32-bit float instead of 8-bit
    pub float_samples: bool,
    /// Key/value pairs embedded as JSON in the ImageDescription tag
    pub metadata: BTreeMap<String, String>,
}

impl Default for RasterWriteOptions {
    fn default() -> Self {
        Self {
            compression: TiffCompression::Lzw,
            predictor: Some(2),
            nodata: Some(-99.0),
            float_samples: false,
            metadata: BTreeMap::new(),
        }
    }
}

impl RasterWriteOptions {
    pub fn builder() -> RasterWriteOptionsBuilder {
        RasterWriteOptionsBuilder::default()
    }

    /// Copy of these options with extra metadata entries.
    pub fn with_metadata<I, K, V>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut options = self.clone();
        options
            .metadata
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        options
    }
}

/// Builder for RasterWriteOptions
#[derive(Default)]
pub struct RasterWriteOptionsBuilder {
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
    nodata: Option<Option<f64>>,
    float_samples: Option<bool>,
    metadata: BTreeMap<String, String>,
}

impl RasterWriteOptionsBuilder {
    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn float_samples(mut self, enable: bool) -> Self {
        self.float_samples = Some(enable);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> RasterWriteOptions {
        let default = RasterWriteOptions::default();
        RasterWriteOptions {
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
            nodata: self.nodata.unwrap_or(default.nodata),
            float_samples: self.float_samples.unwrap_or(default.float_samples),
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_what_is_set() {
        let options = RasterWriteOptions::builder()
            .compression(TiffCompression::DeflateFast)
            .nodata(None)
            .metadata("side", "left")
            .build();

        assert_eq!(options.compression, TiffCompression::DeflateFast);
        assert_eq!(options.predictor, Some(2));
        assert_eq!(options.nodata, None);
        assert!(!options.float_samples);
        assert_eq!(options.metadata.get("side").map(String::as_str), Some("left"));
    }

    #[test]
    fn with_metadata_leaves_original_untouched() {
        let base = RasterWriteOptions::default();
        let tagged = base.with_metadata([("time", "2017-05-27")]);
        assert!(base.metadata.is_empty());
        assert_eq!(tagged.metadata.len(), 1);
    }
}
