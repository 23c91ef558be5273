//! Artifact filenames.
//!
//! ```text
//! {index:04}_{direction}_0x{opcode:04X}_0x{message_id:04X}_{type_name}.bin
//! ```
//!
//! Older artifacts have no message id token:
//!
//! ```text
//! {index:04}_{direction}_0x{opcode:04X}_{type_name}.bin
//! ```
//!
//! The type name may itself contain underscores, so everything after the
//! last fixed token belongs to it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use acpcap_protocol::{Direction, OrderedIdentifiers};
use thiserror::Error;

pub const ARTIFACT_EXTENSION: &str = "bin";

/// Message id written for legacy names.
const LEGACY_MESSAGE_ID: &str = "0x0000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Could not determine message type from filename format.")]
    TooFewTokens,

    #[error("Invalid index '{0}'")]
    InvalidIndex(String),

    #[error("Invalid direction '{0}'")]
    InvalidDirection(String),

    #[error("Invalid opcode '{0}'")]
    InvalidOpcode(String),

    #[error("Invalid message id '{0}'")]
    InvalidMessageId(String),
}

/// Numeric identifier that disambiguates ordered messages.
///
/// Ordered wrappers use the inner event or action id when the type name is in
/// the matching identifier table, and the opcode otherwise.
pub fn message_id(opcode: u32, type_name: &str, ids: &OrderedIdentifiers) -> u32 {
    ids.table_for(opcode)
        .and_then(|table| table.lookup(type_name))
        .unwrap_or(opcode)
}

/// Parse a numeric token: `0x` prefixed hexadecimal, plain decimal otherwise.
pub fn parse_number(token: &str) -> Option<u32> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Raw underscore-separated tokens of an artifact file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTokens<'a> {
    pub index: &'a str,
    pub direction: &'a str,
    pub opcode: &'a str,
    /// `None` for legacy names.
    pub message_id: Option<&'a str>,
    pub type_name: String,
}

impl<'a> NameTokens<'a> {
    /// Split a file stem (no directory, no extension).
    pub fn split(stem: &'a str) -> Result<Self, NameError> {
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 4 {
            return Err(NameError::TooFewTokens);
        }

        let (message_id, type_name) = if parts.len() >= 5 && parts[3].starts_with("0x") {
            (Some(parts[3]), parts[4..].join("_"))
        } else {
            (None, parts[3..].join("_"))
        };

        Ok(Self {
            index: parts[0],
            direction: parts[1],
            opcode: parts[2],
            message_id,
            type_name,
        })
    }

    /// Message id token, with the legacy placeholder.
    pub fn message_id_str(&self) -> &str {
        self.message_id.unwrap_or(LEGACY_MESSAGE_ID)
    }
}

/// Structured form of an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub index: usize,
    pub direction: Direction,
    pub opcode: u32,
    pub message_id: u32,
    pub type_name: String,
}

impl ArtifactName {
    pub fn new(
        index: usize,
        direction: Direction,
        opcode: u32,
        type_name: impl Into<String>,
        ids: &OrderedIdentifiers,
    ) -> Self {
        let type_name = type_name.into();
        Self {
            index,
            direction,
            opcode,
            message_id: message_id(opcode, &type_name, ids),
            type_name,
        }
    }

    /// Filename including the `.bin` extension.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, ARTIFACT_EXTENSION)
    }

    /// Parse a filename or path. The directory and extension are ignored.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NameError> {
        let stem = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        stem.parse()
    }
}

impl fmt::Display for ArtifactName {
    /// File stem, without the extension.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}_{}_0x{:04X}_0x{:04X}_{}",
            self.index, self.direction, self.opcode, self.message_id, self.type_name
        )
    }
}

impl FromStr for ArtifactName {
    type Err = NameError;

    /// Parse a file stem. Legacy names get a message id of zero.
    fn from_str(stem: &str) -> Result<Self, Self::Err> {
        let tokens = NameTokens::split(stem)?;
        let index = tokens
            .index
            .parse()
            .map_err(|_| NameError::InvalidIndex(tokens.index.to_string()))?;
        let direction = tokens
            .direction
            .parse()
            .map_err(|_| NameError::InvalidDirection(tokens.direction.to_string()))?;
        let opcode = parse_number(tokens.opcode)
            .ok_or_else(|| NameError::InvalidOpcode(tokens.opcode.to_string()))?;
        let message_id = match tokens.message_id {
            Some(token) => {
                parse_number(token).ok_or_else(|| NameError::InvalidMessageId(token.to_string()))?
            }
            None => 0,
        };

        Ok(Self {
            index,
            direction,
            opcode,
            message_id,
            type_name: tokens.type_name,
        })
    }
}
