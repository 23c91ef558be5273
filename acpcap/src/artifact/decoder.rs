//! Reading an artifact back into a message and printing it.

use std::fmt;
use std::fs;
use std::path::Path;

use acpcap_protocol::{ordered_wrapper_name, Message, MessageRegistry};
use bytes::Bytes;
use log::debug;

use super::naming::{parse_number, NameError, NameTokens};
use super::ArtifactError;
use crate::inspect::Inspector;

/// Default number of leading bytes shown in a raw dump.
pub const DEFAULT_PREVIEW_BYTES: usize = 50;

/// Length and leading bytes of undecodable data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDump {
    pub len: usize,
    pub preview: Vec<u8>,
}

impl RawDump {
    pub fn new(data: &[u8], preview_bytes: usize) -> Self {
        Self {
            len: data.len(),
            preview: data[..data.len().min(preview_bytes)].to_vec(),
        }
    }
}

impl fmt::Display for RawDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raw binary data length: {} bytes", self.len)?;
        f.write_str("First bytes: ")?;
        for byte in &self.preview {
            write!(f, "{:02X} ", byte)?;
        }
        Ok(())
    }
}

/// Identification lines taken from the filename, printed as they appear there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub stem: String,
    pub index: String,
    pub direction: String,
    pub opcode: String,
    pub message_id: String,
    pub type_name: String,
}

impl fmt::Display for ArtifactHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.stem)?;
        writeln!(f, "Index: {}", self.index)?;
        writeln!(f, "Direction: {}", self.direction)?;
        writeln!(f, "OpCode: {}", self.opcode)?;
        writeln!(f, "Message ID: {}", self.message_id)?;
        write!(f, "Message Name: {}", self.type_name)
    }
}

/// What became of the artifact body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The body decoded; `fields` is the rendered field listing.
    Decoded { opcode: u32, fields: String },
    /// The body could not be decoded and is shown raw.
    Fallback { reason: String, raw: RawDump },
}

/// Everything printed for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub source: String,
    /// `None` when the filename could not be split into tokens.
    pub header: Option<ArtifactHeader>,
    pub outcome: DecodeOutcome,
}

impl fmt::Display for DecodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reading binary file: {}", self.source)?;
        if let Some(header) = &self.header {
            writeln!(f, "{}", header)?;
        }
        match &self.outcome {
            DecodeOutcome::Decoded { opcode, fields } => {
                writeln!(f, "Message OpCode: 0x{:04X}", opcode)?;
                f.write_str(fields)
            }
            DecodeOutcome::Fallback { reason, raw } => {
                writeln!(f, "{}", reason)?;
                writeln!(f, "{}", raw)
            }
        }
    }
}

/// Turns artifact files back into printable reports.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactDecoder<'r> {
    registry: &'r MessageRegistry,
    inspector: Inspector,
    preview_bytes: usize,
}

impl<'r> ArtifactDecoder<'r> {
    pub fn new(registry: &'r MessageRegistry, inspector: Inspector, preview_bytes: usize) -> Self {
        Self {
            registry,
            inspector,
            preview_bytes,
        }
    }

    /// Read and decode the artifact at `path`.
    pub fn decode_file(&self, path: &Path) -> Result<DecodeReport, ArtifactError> {
        let data = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut report = self.decode(&stem, &data);
        report.source = path.display().to_string();
        Ok(report)
    }

    /// Decode artifact bytes, identified by the file stem they were stored under.
    pub fn decode(&self, stem: &str, data: &[u8]) -> DecodeReport {
        let fallback = |reason: String| DecodeOutcome::Fallback {
            reason,
            raw: RawDump::new(data, self.preview_bytes),
        };

        let tokens = match NameTokens::split(stem) {
            Ok(tokens) => tokens,
            Err(e) => {
                return DecodeReport {
                    source: stem.to_string(),
                    header: None,
                    outcome: fallback(e.to_string()),
                }
            }
        };
        let header = ArtifactHeader {
            stem: stem.to_string(),
            index: tokens.index.to_string(),
            direction: tokens.direction.to_string(),
            opcode: tokens.opcode.to_string(),
            message_id: tokens.message_id_str().to_string(),
            type_name: tokens.type_name.clone(),
        };

        let outcome = match parse_number(tokens.opcode) {
            Some(opcode) => self.decode_body(opcode, &tokens.type_name, data),
            None => fallback(NameError::InvalidOpcode(tokens.opcode.to_string()).to_string()),
        };

        DecodeReport {
            source: stem.to_string(),
            header: Some(header),
            outcome,
        }
    }

    fn decode_body(&self, opcode: u32, type_name: &str, data: &[u8]) -> DecodeOutcome {
        match self.read_message(opcode, type_name, data) {
            Ok(message) => DecodeOutcome::Decoded {
                opcode: message.opcode(),
                fields: self.inspector.render(message.as_describe(), 1),
            },
            Err(reason) => DecodeOutcome::Fallback {
                reason,
                raw: RawDump::new(data, self.preview_bytes),
            },
        }
    }

    /// Decode an artifact body as the type its filename names.
    ///
    /// Ordered artifacts are named after the inner type but decode through the
    /// wrapper. The error is the line printed before the raw dump.
    pub fn read_message(
        &self,
        opcode: u32,
        type_name: &str,
        data: &[u8],
    ) -> Result<Box<dyn Message>, String> {
        let kind = match ordered_wrapper_name(opcode) {
            Some(wrapper) => self
                .registry
                .find(wrapper)
                .ok_or_else(|| format!("Could not find ordered message type: {}", wrapper))?,
            None => self
                .registry
                .find(type_name)
                .ok_or_else(|| format!("Could not find message type: {}", type_name))?,
        };

        let decode = kind
            .decode
            .ok_or_else(|| "No Read method found on message type.".to_string())?;

        let mut input = Bytes::copy_from_slice(data);
        let message = decode(&mut input).map_err(|e| format!("Error deserializing: {}", e))?;
        if !input.is_empty() {
            debug!("{}: {} trailing bytes ignored", kind.name, input.len());
        }
        Ok(message)
    }
}

/// Decode artifact bytes with the default inspector settings.
pub fn decode_artifact(stem: &str, data: &[u8], registry: &MessageRegistry) -> DecodeReport {
    ArtifactDecoder::new(registry, Inspector::default(), DEFAULT_PREVIEW_BYTES).decode(stem, data)
}

/// Read and decode an artifact file with the default inspector settings.
pub fn decode_file(path: &Path, registry: &MessageRegistry) -> Result<DecodeReport, ArtifactError> {
    ArtifactDecoder::new(registry, Inspector::default(), DEFAULT_PREVIEW_BYTES).decode_file(path)
}
