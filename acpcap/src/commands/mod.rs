//! Handlers for the two run modes.

mod decode;
mod extract;

pub use decode::run_decode;
pub use extract::{run_extract, ExtractSummary};
