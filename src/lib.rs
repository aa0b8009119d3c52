//! Per-user activity statistics for HTML chat exports.
//!
//! Messages are pulled out of the export once, cached as CSV keyed by the
//! export's content hash, and aggregated into weekday, month and hour
//! distributions that are rendered as stacked histograms.

pub mod analyzer;
pub mod cache;
pub mod cli;
pub mod date;
pub mod error;
pub mod extract;
pub mod model;
pub mod renderer;

pub use error::{Error, Result};
