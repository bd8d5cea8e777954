//! Common utilities module
//!
//! This module contains shared utilities used across the image pipeline.

pub mod error;
pub mod report;
pub mod timing;

pub use error::{PipelineError, Result};
pub use report::{BatchReport, SkippedEntry};
pub use timing::{PipelineTimings, StepTiming, Timer};
