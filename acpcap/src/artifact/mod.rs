//! Per-message artifact files: naming, writing and reading back.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod decoder;
pub mod encoder;
pub mod naming;

pub use decoder::{
    decode_artifact, decode_file, ArtifactDecoder, ArtifactHeader, DecodeOutcome, DecodeReport,
    RawDump, DEFAULT_PREVIEW_BYTES,
};
pub use encoder::write_artifacts;
pub use naming::{message_id, ArtifactName, NameError, NameTokens};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Output directory not found: {}", .0.display())]
    OutputDirNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
