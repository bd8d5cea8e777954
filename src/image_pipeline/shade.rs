//! Shade-artifact reduction by split rendering and darker-pixel merging.

mod darker;
mod engine;
mod split;

pub use darker::{MergeDecision, NEAR_BLACK_THRESHOLD, brightness, decide, decide_pair, merge_rgba};
pub use engine::{MERGED_DIR, ShadeMergeEngine};
pub use split::{SplitAssignment, TIF_LIST};
