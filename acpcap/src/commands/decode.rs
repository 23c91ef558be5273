//! Artifact decoding: print one artifact.

use std::path::Path;

use acpcap_protocol::MessageRegistry;

use crate::artifact::{ArtifactDecoder, DecodeReport};
use crate::config::Settings;
use crate::error::Result;
use crate::inspect::Inspector;

/// Decode the artifact at `path` into a printable report.
pub fn run_decode(path: &Path, settings: &Settings) -> Result<DecodeReport> {
    let registry = MessageRegistry::builtin()?;
    let decoder = ArtifactDecoder::new(
        &registry,
        Inspector::new(settings.max_items),
        settings.preview_bytes,
    );
    Ok(decoder.decode_file(path)?)
}
