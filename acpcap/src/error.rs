//! Top-level error type of the tool.

use std::path::PathBuf;

use acpcap_protocol::ProtocolError;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::capture::CaptureError;
use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("File not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Output directory not found: {}", .0.display())]
    OutputDirNotFound(PathBuf),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, AppError>;
