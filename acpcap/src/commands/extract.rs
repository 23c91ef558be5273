//! Capture processing: split a capture into per-message artifacts.

use std::path::{Path, PathBuf};

use acpcap_protocol::{MessageRegistry, OrderedIdentifiers};
use log::{debug, info};

use crate::artifact::write_artifacts;
use crate::capture::{demultiplex, CaptureSource, DemuxStats, FrameClassifier, PcapFileSource};
use crate::collect::MessageCollector;
use crate::config::Settings;
use crate::error::Result;

/// Outcome of one extraction run.
#[derive(Debug)]
pub struct ExtractSummary {
    pub stats: DemuxStats,
    pub packets: u64,
    /// Messages dropped because some of their fragments never arrived.
    pub incomplete_fragments: usize,
    pub written: Vec<PathBuf>,
}

/// Read `capture` and write one artifact per message into `output_dir`.
pub fn run_extract(capture: &Path, output_dir: &Path, settings: &Settings) -> Result<ExtractSummary> {
    info!("Processing packet capture: {}", capture.display());
    info!("Output directory: {}", output_dir.display());

    let mut source = PcapFileSource::open(capture)?;
    extract_from(&mut source, output_dir, settings)
}

/// Same as [`run_extract`], from an already opened capture source.
pub(crate) fn extract_from<S>(
    source: &mut S,
    output_dir: &Path,
    settings: &Settings,
) -> Result<ExtractSummary>
where
    S: CaptureSource + ?Sized,
{
    let classifier = FrameClassifier::new(settings.local_address, settings.header_mode);
    let mut collector = MessageCollector::new(MessageRegistry::builtin()?);

    let stats = demultiplex(source, &classifier, &mut collector)?;
    let packets = collector.packets();
    let incomplete_fragments = collector.incomplete_fragments();
    if incomplete_fragments > 0 {
        debug!("{} incomplete fragments dropped", incomplete_fragments);
    }
    let messages = collector.into_messages();
    info!("PCAP processing complete. Got {} messages.", messages.len());

    let written = write_artifacts(&messages, output_dir, &OrderedIdentifiers::default())?;
    Ok(ExtractSummary {
        stats,
        packets,
        incomplete_fragments,
        written,
    })
}
