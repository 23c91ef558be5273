//! acpcap library - capture splitting and artifact printing for Asheron's Call traffic.
//!
//! A capture is scanned frame by frame ([`capture`]), the payloads are fed to
//! the protocol's packet reader ([`collect`]) and every completed message is
//! written to its own file ([`artifact`]). Artifacts can be decoded again and
//! printed field by field ([`inspect`]).

pub mod artifact;
pub mod capture;
pub mod collect;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod inspect;

// Re-export commonly used types
pub use artifact::{ArtifactDecoder, ArtifactError, ArtifactName, DecodeOutcome, DecodeReport};
pub use capture::{
    demultiplex, CaptureBlock, CaptureError, CaptureSource, DemuxStats, ExtractedPayload,
    FrameClassifier, HeaderMode, PayloadSink, PcapFileSource,
};
pub use collect::{MessageCollector, SequencedMessage};
pub use config::Settings;
pub use error::AppError;
pub use inspect::Inspector;
