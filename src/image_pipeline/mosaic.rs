//! Field mosaics: indexing per-frame GeoTIFFs into a virtual mosaic and
//! rendering it at fixed resolution tiers.

mod index_builder;
mod renderer;
mod sampler;
pub mod types;

pub use index_builder::{MosaicIndexBuilder, write_list_file};
pub use renderer::{FieldWindow, ResolutionRenderer, ResolutionTier};
pub use sampler::{MosaicSampler, RasterCache};
pub use types::{DEFAULT_NODATA, MosaicSource, VirtualMosaic};
