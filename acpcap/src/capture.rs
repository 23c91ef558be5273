//! Capture reading and demultiplexing.
//!
//! Frames are read block by block from a pcap or pcapng file, classified by
//! direction against the local address, stripped of their link, network and
//! transport headers, and pushed into a [`PayloadSink`] in file order.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use acpcap_protocol::Direction;
use log::{debug, info, trace, warn};
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{create_reader, PcapBlockOwned, PcapError};
use serde::Deserialize;
use thiserror::Error;

/// Frames shorter than this cannot hold the Ethernet and IPv4 headers.
pub const MIN_FRAME_LEN: usize = 34;
/// Ethernet (14) + IPv4 (20) + UDP (8).
pub const FIXED_HEADER_LEN: usize = 42;

const ETHERTYPE_OFFSET: usize = 12;
const SOURCE_ADDR_OFFSET: usize = 26;
const DESTINATION_ADDR_OFFSET: usize = 30;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Capture errors.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open capture {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized capture format: {0}")]
    Format(String),

    #[error("Failed to read capture: {0}")]
    Read(String),
}

/// One block of a capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBlock {
    /// Link-layer frame, for packet blocks only.
    pub frame: Option<Vec<u8>>,
}

/// Something that yields capture blocks in file order.
pub trait CaptureSource {
    /// The next block, or `None` at the end of the capture.
    fn next_block(&mut self) -> Result<Option<CaptureBlock>, CaptureError>;
}

impl CaptureSource for std::vec::IntoIter<CaptureBlock> {
    fn next_block(&mut self) -> Result<Option<CaptureBlock>, CaptureError> {
        Ok(self.next())
    }
}

fn describe_pcap_error<I>(error: &PcapError<I>) -> String {
    // The nom variants carry the remaining input; keep it out of messages.
    match error {
        PcapError::Eof => "end of file".to_string(),
        PcapError::Incomplete(_) => "truncated block".to_string(),
        PcapError::HeaderNotRecognized => "header not recognized".to_string(),
        PcapError::ReadError => "read error".to_string(),
        PcapError::UnexpectedEof => "unexpected end of file".to_string(),
        PcapError::BufferTooSmall => "block larger than the read buffer".to_string(),
        PcapError::NomError(_, kind) => format!("parse error ({:?})", kind),
        #[allow(unreachable_patterns)]
        _ => "malformed capture".to_string(),
    }
}

/// Classic pcap or pcapng reader.
pub struct PcapFileSource {
    reader: Box<dyn PcapReaderIterator>,
}

impl PcapFileSource {
    /// Open a capture file. The format is detected from its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Read a capture from any byte stream.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Self, CaptureError> {
        let reader = create_reader(READ_BUFFER_SIZE, reader)
            .map_err(|e| CaptureError::Format(describe_pcap_error(&e)))?;
        Ok(Self { reader })
    }
}

fn truncated() -> Option<CaptureBlock> {
    warn!("Capture truncated; ignoring the incomplete last block");
    None
}

impl CaptureSource for PcapFileSource {
    fn next_block(&mut self) -> Result<Option<CaptureBlock>, CaptureError> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::Legacy(packet) => Some(packet.data.to_vec()),
                        PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                            let len = (packet.caplen as usize).min(packet.data.len());
                            Some(packet.data[..len].to_vec())
                        }
                        _ => None,
                    };
                    self.reader.consume(offset);
                    return Ok(Some(CaptureBlock { frame }));
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::UnexpectedEof) => return Ok(truncated()),
                Err(PcapError::Incomplete(_)) => {
                    if self.reader.reader_exhausted() {
                        return Ok(truncated());
                    }
                    self.reader
                        .refill()
                        .map_err(|e| CaptureError::Read(describe_pcap_error(&e)))?;
                }
                Err(e) => return Err(CaptureError::Read(describe_pcap_error(&e))),
            }
        }
    }
}

/// How link, network and transport headers are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Strip a constant 42-byte prefix (Ethernet + IPv4 without options + UDP).
    #[default]
    Fixed,
    /// Read the header lengths: IPv4 options, one VLAN tag, UDP or TCP.
    Parsed,
}

impl fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderMode::Fixed => f.write_str("fixed"),
            HeaderMode::Parsed => f.write_str("parsed"),
        }
    }
}

/// Application payload of one frame, with the direction it travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedPayload<'a> {
    pub direction: Direction,
    pub data: &'a [u8],
}

/// Decides whether a frame is kept, and in which direction.
#[derive(Debug, Clone, Copy)]
pub struct FrameClassifier {
    local_address: Ipv4Addr,
    header_mode: HeaderMode,
}

impl Default for FrameClassifier {
    fn default() -> Self {
        Self::new(Ipv4Addr::LOCALHOST, HeaderMode::Fixed)
    }
}

impl FrameClassifier {
    pub fn new(local_address: Ipv4Addr, header_mode: HeaderMode) -> Self {
        Self {
            local_address,
            header_mode,
        }
    }

    /// Extract the payload of `frame`, or `None` if the frame is dropped.
    pub fn classify<'a>(&self, frame: &'a [u8]) -> Option<ExtractedPayload<'a>> {
        let (source, destination, data) = match self.header_mode {
            HeaderMode::Fixed => strip_fixed(frame)?,
            HeaderMode::Parsed => parse_frame(frame).ok().map(|(data, (s, d))| (s, d, data))?,
        };

        let direction = if source == self.local_address {
            Direction::ClientToServer
        } else if destination == self.local_address {
            Direction::ServerToClient
        } else {
            return None;
        };
        Some(ExtractedPayload { direction, data })
    }
}

fn address_at(frame: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    )
}

fn strip_fixed(frame: &[u8]) -> Option<(Ipv4Addr, Ipv4Addr, &[u8])> {
    if frame.len() < MIN_FRAME_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }
    let source = address_at(frame, SOURCE_ADDR_OFFSET);
    let destination = address_at(frame, DESTINATION_ADDR_OFFSET);
    Some((source, destination, frame.get(FIXED_HEADER_LEN..).unwrap_or(&[])))
}

fn reject<T>(input: &[u8]) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Verify,
    )))
}

fn ethernet(input: &[u8]) -> IResult<&[u8], u16> {
    let (input, _) = take(12usize)(input)?;
    let (input, ethertype) = be_u16(input)?;
    if ethertype == ETHERTYPE_VLAN {
        let (input, _tci) = take(2usize)(input)?;
        return be_u16(input);
    }
    Ok((input, ethertype))
}

/// Returns the IPv4 body and `(source, destination, protocol)`.
fn ipv4(input: &[u8]) -> IResult<&[u8], (Ipv4Addr, Ipv4Addr, u8)> {
    let (input, version_ihl) = be_u8(input)?;
    let header_len = usize::from(version_ihl & 0x0F) * 4;
    if version_ihl >> 4 != 4 || header_len < 20 {
        return reject(input);
    }
    let (input, _tos) = be_u8(input)?;
    let (input, total_len) = be_u16(input)?;
    let (input, _id_flags_ttl) = take(5usize)(input)?;
    let (input, protocol) = be_u8(input)?;
    let (input, _checksum) = be_u16(input)?;
    let (input, source) = be_u32(input)?;
    let (input, destination) = be_u32(input)?;
    let (input, _options) = take(header_len - 20)(input)?;

    // Short Ethernet frames are padded; the IPv4 length marks the real end.
    let total_len = usize::from(total_len);
    let body = if total_len >= header_len {
        &input[..(total_len - header_len).min(input.len())]
    } else {
        input
    };
    Ok((
        body,
        (Ipv4Addr::from(source), Ipv4Addr::from(destination), protocol),
    ))
}

fn transport(protocol: u8, input: &[u8]) -> IResult<&[u8], ()> {
    match protocol {
        IPPROTO_UDP => {
            let (input, _) = take(8usize)(input)?;
            Ok((input, ()))
        }
        IPPROTO_TCP => {
            let (after_ports, _) = take(12usize)(input)?;
            let (_, data_offset) = be_u8(after_ports)?;
            let header_len = usize::from(data_offset >> 4) * 4;
            if header_len < 20 {
                return reject(input);
            }
            let (input, _) = take(header_len)(input)?;
            Ok((input, ()))
        }
        _ => reject(input),
    }
}

fn parse_frame(frame: &[u8]) -> IResult<&[u8], (Ipv4Addr, Ipv4Addr)> {
    let (input, ethertype) = ethernet(frame)?;
    if ethertype != ETHERTYPE_IPV4 {
        return reject(input);
    }
    let (body, (source, destination, protocol)) = ipv4(input)?;
    let (payload, ()) = transport(protocol, body)?;
    Ok((payload, (source, destination)))
}

/// Receives classified payloads in capture order.
pub trait PayloadSink {
    fn push(&mut self, direction: Direction, payload: &[u8]);
}

/// Counters of one demultiplexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub blocks: u64,
    pub frames: u64,
    pub client_payloads: u64,
    pub server_payloads: u64,
    pub dropped: u64,
}

impl fmt::Display for DemuxStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks, {} frames, {} C2S, {} S2C, {} dropped",
            self.blocks, self.frames, self.client_payloads, self.server_payloads, self.dropped
        )
    }
}

/// Read every block of `source` and push the kept payloads into `sink`.
pub fn demultiplex<S, K>(
    source: &mut S,
    classifier: &FrameClassifier,
    sink: &mut K,
) -> Result<DemuxStats, CaptureError>
where
    S: CaptureSource + ?Sized,
    K: PayloadSink + ?Sized,
{
    let mut stats = DemuxStats::default();

    while let Some(block) = source.next_block()? {
        stats.blocks += 1;
        let Some(frame) = block.frame else {
            continue;
        };
        stats.frames += 1;

        match classifier.classify(&frame) {
            Some(payload) => {
                trace!("{} payload of {} bytes", payload.direction.short(), payload.data.len());
                match payload.direction {
                    Direction::ClientToServer => stats.client_payloads += 1,
                    Direction::ServerToClient => stats.server_payloads += 1,
                }
                sink.push(payload.direction, payload.data);
            }
            None => {
                debug!("dropped frame {} ({} bytes)", stats.frames, frame.len());
                stats.dropped += 1;
            }
        }
    }

    info!("Capture scan finished: {}", stats);
    Ok(stats)
}
