use std::path::PathBuf;

use clap::Parser;

use crate::capture::HeaderMode;
use crate::config::Overrides;
use crate::error::AppError;

#[derive(Debug, Parser)]
#[clap(name = "acpcap")]
#[clap(about = "acpcap splits Asheron's Call packet captures into per-message artifacts and prints artifacts back.", long_about = None)]
#[clap(version)]
pub struct Cli {
    /// The inputs.{n}
    /// `<capture> <output_dir>` splits a pcap/pcapng capture into
    /// one `.bin` file per message inside the existing output directory.{n}
    /// `<artifact.bin>` decodes a single artifact and prints its fields.
    #[clap(value_name = "INPUT", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Configuration file.{n}
    /// Defaults to `acpcap.toml` in the working directory when it exists.
    #[clap(short = 'f', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// IPv4 address of the client side of the capture.
    #[clap(long, value_name = "IPV4")]
    pub local_address: Option<String>,

    /// How link, network and transport headers are stripped.
    #[clap(value_enum, long)]
    pub header_mode: Option<HeaderMode>,

    /// Enable debug logging.
    #[clap(short, long)]
    pub verbose: bool,
}

/// What a run does, derived from the positional inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Print one artifact.
    Decode { artifact: PathBuf },
    /// Split a capture into artifacts.
    Extract { capture: PathBuf, output_dir: PathBuf },
}

pub const DECODE_USAGE: &str = "Usage for .bin files: acpcap <bin_file>";
pub const EXTRACT_USAGE: &str = "Usage for pcap files: acpcap <pcap_file> <output_dir>\n  \
    <pcap_file>: Path to the pcap file to process\n  \
    <output_dir>: Directory where .bin files will be written";

impl Cli {
    /// Check the preconditions and pick the mode.
    ///
    /// The input must exist; a `.bin` extension selects decoding with exactly
    /// one input, anything else extraction with exactly two, the second an
    /// existing directory.
    pub fn mode(&self) -> Result<Mode, AppError> {
        let Some(input) = self.inputs.first() else {
            return Err(AppError::InputNotFound(PathBuf::new()));
        };
        if !input.is_file() {
            return Err(AppError::InputNotFound(input.clone()));
        }

        let is_artifact = input
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("bin"))
            .unwrap_or(false);

        if is_artifact {
            if self.inputs.len() != 1 {
                return Err(AppError::Usage(DECODE_USAGE.to_string()));
            }
            return Ok(Mode::Decode {
                artifact: input.clone(),
            });
        }

        if self.inputs.len() != 2 {
            return Err(AppError::Usage(EXTRACT_USAGE.to_string()));
        }
        let output_dir = &self.inputs[1];
        if !output_dir.is_dir() {
            return Err(AppError::OutputDirNotFound(output_dir.clone()));
        }
        Ok(Mode::Extract {
            capture: input.clone(),
            output_dir: output_dir.clone(),
        })
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            local_address: self.local_address.clone(),
            header_mode: self.header_mode,
        }
    }
}
