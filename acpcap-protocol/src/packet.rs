//! Transport packets and blob fragment reassembly.
//!
//! A datagram holds one or more packets:
//! ```text
//! +----------------+------------------+-----------------------------+
//! | PacketHeader   | optional headers | fragments (BLOB_FRAGMENTS)  |
//! | 20 bytes       | per flag bits    | 16-byte header + chunk, ... |
//! +----------------+------------------+-----------------------------+
//! ```
//! `PacketHeader::size` counts everything after the 20-byte header.
//! Fragments sharing a sequence number are joined into one message.

use std::collections::HashMap;
use bitflags::bitflags;
use bytes::{Buf, Bytes};
use log::{debug, trace, warn};

use crate::codec::{get_bytes, get_u16, get_u32};
use crate::error::ProtocolError;
use crate::messages::Message;
use crate::registry::MessageRegistry;
use crate::types::Direction;

/// Maximum payload carried by a single fragment.
pub const FRAGMENT_CHUNK_SIZE: usize = 448;

bitflags! {
    /// Flag bits of [`PacketHeader`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketHeaderFlags: u32 {
        const RETRANSMISSION = 0x0000_0001;
        const ENCRYPTED_CHECKSUM = 0x0000_0002;
        const BLOB_FRAGMENTS = 0x0000_0004;
        const SERVER_SWITCH = 0x0000_0100;
        const LOGON_SERVER_ADDR = 0x0000_0200;
        const EMPTY_HEADER1 = 0x0000_0400;
        const REFERRAL = 0x0000_0800;
        const REQUEST_RETRANSMIT = 0x0000_1000;
        const REJECT_RETRANSMIT = 0x0000_2000;
        const ACK_SEQUENCE = 0x0000_4000;
        const DISCONNECT = 0x0000_8000;
        const LOGIN_REQUEST = 0x0001_0000;
        const WORLD_LOGIN_REQUEST = 0x0002_0000;
        const CONNECT_REQUEST = 0x0004_0000;
        const CONNECT_RESPONSE = 0x0008_0000;
        const NET_ERROR = 0x0010_0000;
        const NET_ERROR_DISCONNECT = 0x0020_0000;
        const CICMD_COMMAND = 0x0040_0000;
        const TIME_SYNC = 0x0100_0000;
        const ECHO_REQUEST = 0x0200_0000;
        const ECHO_RESPONSE = 0x0400_0000;
        const FLOW = 0x0800_0000;
    }
}

#[derive(Debug, Clone, Copy)]
enum OptionalHeader {
    Fixed(usize),
    /// A `u32` count followed by that many `u32` sequence numbers.
    SequenceList,
    /// Runs to the end of the packet.
    RestOfPacket,
}

/// Optional headers in the order they follow the packet header.
const OPTIONAL_HEADERS: [(PacketHeaderFlags, OptionalHeader); 15] = [
    (PacketHeaderFlags::SERVER_SWITCH, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::REQUEST_RETRANSMIT, OptionalHeader::SequenceList),
    (PacketHeaderFlags::REJECT_RETRANSMIT, OptionalHeader::SequenceList),
    (PacketHeaderFlags::ACK_SEQUENCE, OptionalHeader::Fixed(4)),
    (PacketHeaderFlags::LOGIN_REQUEST, OptionalHeader::RestOfPacket),
    (PacketHeaderFlags::WORLD_LOGIN_REQUEST, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::CONNECT_REQUEST, OptionalHeader::Fixed(32)),
    (PacketHeaderFlags::CONNECT_RESPONSE, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::NET_ERROR, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::NET_ERROR_DISCONNECT, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::CICMD_COMMAND, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::TIME_SYNC, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::ECHO_REQUEST, OptionalHeader::Fixed(4)),
    (PacketHeaderFlags::ECHO_RESPONSE, OptionalHeader::Fixed(8)),
    (PacketHeaderFlags::FLOW, OptionalHeader::Fixed(6)),
];

/// Fixed header at the start of every packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub flags: PacketHeaderFlags,
    pub checksum: u32,
    pub id: u16,
    pub time: u16,
    pub size: u16,
    pub iteration: u16,
}

impl PacketHeader {
    pub const SIZE: usize = 20;

    pub fn read(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            sequence: get_u32(buf)?,
            // Unknown bits are kept so the header reads back as it was sent.
            flags: PacketHeaderFlags::from_bits_retain(get_u32(buf)?),
            checksum: get_u32(buf)?,
            id: get_u16(buf)?,
            time: get_u16(buf)?,
            size: get_u16(buf)?,
            iteration: get_u16(buf)?,
        })
    }
}

/// Skip the optional headers announced by `flags`.
fn skip_optional_headers(flags: PacketHeaderFlags, body: &mut Bytes) -> Result<(), ProtocolError> {
    for (flag, header) in OPTIONAL_HEADERS {
        if !flags.contains(flag) {
            continue;
        }
        let len = match header {
            OptionalHeader::Fixed(len) => len,
            OptionalHeader::SequenceList => get_u32(body)? as usize * 4,
            OptionalHeader::RestOfPacket => body.remaining(),
        };
        get_bytes(body, len)?;
    }
    Ok(())
}

/// Header in front of each blob fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentHeader {
    pub sequence: u32,
    pub id: u32,
    pub count: u16,
    /// Size of the fragment, this header included.
    pub size: u16,
    pub index: u16,
    pub group: u16,
}

impl FragmentHeader {
    pub const SIZE: usize = 16;

    pub fn read(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let header = Self {
            sequence: get_u32(buf)?,
            id: get_u32(buf)?,
            count: get_u16(buf)?,
            size: get_u16(buf)?,
            index: get_u16(buf)?,
            group: get_u16(buf)?,
        };

        if (header.size as usize) < Self::SIZE {
            return Err(ProtocolError::InvalidFragment(format!(
                "size {} is smaller than the header",
                header.size
            )));
        }
        if header.size as usize - Self::SIZE > FRAGMENT_CHUNK_SIZE {
            return Err(ProtocolError::InvalidFragment(format!(
                "size {} exceeds the chunk size",
                header.size
            )));
        }
        if header.index >= header.count {
            return Err(ProtocolError::InvalidFragment(format!(
                "index {} out of {}",
                header.index, header.count
            )));
        }
        Ok(header)
    }

    /// Length of the chunk following the header.
    pub fn chunk_len(&self) -> usize {
        self.size as usize - Self::SIZE
    }
}

#[derive(Debug)]
struct PendingFragment {
    chunks: Vec<Option<Bytes>>,
    received: usize,
}

impl PendingFragment {
    fn new(count: u16) -> Self {
        Self {
            chunks: vec![None; count as usize],
            received: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.chunks.len()
    }

    fn assemble(self) -> Bytes {
        let mut data = Vec::with_capacity(self.chunks.len() * FRAGMENT_CHUNK_SIZE);
        for chunk in self.chunks.into_iter().flatten() {
            data.extend_from_slice(&chunk);
        }
        Bytes::from(data)
    }
}

/// Joins fragments into messages, keyed by fragment sequence.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    pending: HashMap<u32, PendingFragment>,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk. Returns the message bytes once every chunk has arrived.
    pub fn add(&mut self, header: &FragmentHeader, chunk: Bytes) -> Option<Bytes> {
        let pending = self
            .pending
            .entry(header.sequence)
            .or_insert_with(|| PendingFragment::new(header.count));

        match pending.chunks.get_mut(header.index as usize) {
            Some(slot) if slot.is_none() => {
                *slot = Some(chunk);
                pending.received += 1;
            }
            Some(_) => {
                trace!("duplicate chunk {} of fragment {}", header.index, header.sequence);
            }
            None => {
                // A later chunk disagrees with the first on the chunk count.
                warn!(
                    "chunk {} does not fit fragment {} of {} chunks",
                    header.index,
                    header.sequence,
                    pending.chunks.len()
                );
            }
        }

        if !pending.is_complete() {
            return None;
        }
        self.pending.remove(&header.sequence).map(PendingFragment::assemble)
    }

    /// Number of fragments still waiting for chunks.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// One parsed packet and the messages completed inside it.
#[derive(Debug)]
pub struct Packet {
    pub direction: Direction,
    pub header: PacketHeader,
    pub messages: Vec<Box<dyn Message>>,
}

/// Stateful reader that turns datagram payloads into messages.
///
/// Fragment state is kept separately for each direction.
pub struct PacketReader {
    registry: MessageRegistry,
    client_fragments: FragmentAssembler,
    server_fragments: FragmentAssembler,
}

impl PacketReader {
    pub fn new(registry: MessageRegistry) -> Self {
        Self {
            registry,
            client_fragments: FragmentAssembler::new(),
            server_fragments: FragmentAssembler::new(),
        }
    }

    /// Fragments of either direction still waiting for chunks.
    ///
    /// At the end of a capture these are messages that never completed.
    pub fn incomplete_fragments(&self) -> usize {
        self.client_fragments.pending() + self.server_fragments.pending()
    }

    /// Feed a datagram sent by the client.
    pub fn handle_c2s_packet<F>(&mut self, data: &[u8], on_packet: F)
    where
        F: FnMut(Packet),
    {
        self.handle(Direction::ClientToServer, data, on_packet)
    }

    /// Feed a datagram sent by the server.
    pub fn handle_s2c_packet<F>(&mut self, data: &[u8], on_packet: F)
    where
        F: FnMut(Packet),
    {
        self.handle(Direction::ServerToClient, data, on_packet)
    }

    fn handle<F>(&mut self, direction: Direction, data: &[u8], mut on_packet: F)
    where
        F: FnMut(Packet),
    {
        let mut datagram = Bytes::copy_from_slice(data);
        while datagram.has_remaining() {
            match self.read_packet(direction, &mut datagram) {
                Ok(packet) => on_packet(packet),
                Err(e) => {
                    warn!(
                        "{}: dropping {} bytes of malformed datagram: {}",
                        direction.short(),
                        datagram.remaining(),
                        e
                    );
                    return;
                }
            }
        }
    }

    fn read_packet(&mut self, direction: Direction, datagram: &mut Bytes) -> Result<Packet, ProtocolError> {
        let header = PacketHeader::read(datagram)?;
        let size = header.size as usize;
        if size > datagram.remaining() {
            return Err(ProtocolError::InvalidPacket(format!(
                "declared size {} but only {} bytes left",
                size,
                datagram.remaining()
            )));
        }
        let mut body = datagram.split_to(size);
        trace!(
            "{} packet seq={} flags={:?} size={}",
            direction.short(),
            header.sequence,
            header.flags,
            size
        );

        skip_optional_headers(header.flags, &mut body)?;

        let mut messages = Vec::new();
        if header.flags.contains(PacketHeaderFlags::BLOB_FRAGMENTS) {
            while body.has_remaining() {
                let fragment = FragmentHeader::read(&mut body)?;
                let chunk = get_bytes(&mut body, fragment.chunk_len())?;
                let assembler = match direction {
                    Direction::ClientToServer => &mut self.client_fragments,
                    Direction::ServerToClient => &mut self.server_fragments,
                };
                if let Some(data) = assembler.add(&fragment, chunk) {
                    if let Some(message) = self.decode(direction, data) {
                        messages.push(message);
                    }
                }
            }
        }

        Ok(Packet {
            direction,
            header,
            messages,
        })
    }

    fn decode(&self, direction: Direction, data: Bytes) -> Option<Box<dyn Message>> {
        match self.registry.decode_message(direction, data.clone()) {
            Ok(message) => {
                debug!(
                    "{} 0x{:04X} {}",
                    direction.short(),
                    message.opcode(),
                    message.type_name()
                );
                Some(message)
            }
            Err(e) => {
                warn!("{}: keeping undecodable message as raw bytes: {}", direction.short(), e);
                self.registry.raw_message(direction, data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EffectsSoundEvent, ItemServerSaysRemove, MessageBody};
    use crate::ordered::{GameAction, OrderedGameAction};
    use crate::types::Sound;
    use bytes::{BufMut, BytesMut};

    fn fragment(buf: &mut BytesMut, sequence: u32, count: u16, index: u16, chunk: &[u8]) {
        buf.put_u32_le(sequence);
        buf.put_u32_le(0x0B00_0000 | sequence);
        buf.put_u16_le(count);
        buf.put_u16_le((FragmentHeader::SIZE + chunk.len()) as u16);
        buf.put_u16_le(index);
        buf.put_u16_le(5);
        buf.put_slice(chunk);
    }

    fn packet(buf: &mut BytesMut, flags: PacketHeaderFlags, optional: &[u8], fragments: &[u8]) {
        buf.put_u32_le(1);
        buf.put_u32_le(flags.bits());
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le((optional.len() + fragments.len()) as u16);
        buf.put_u16_le(0);
        buf.put_slice(optional);
        buf.put_slice(fragments);
    }

    fn collect(reader: &mut PacketReader, direction: Direction, data: &[u8]) -> Vec<Packet> {
        let mut packets = Vec::new();
        match direction {
            Direction::ClientToServer => reader.handle_c2s_packet(data, |p| packets.push(p)),
            Direction::ServerToClient => reader.handle_s2c_packet(data, |p| packets.push(p)),
        }
        packets
    }

    fn reader() -> PacketReader {
        PacketReader::new(MessageRegistry::builtin().unwrap())
    }

    #[test]
    fn test_single_fragment_message() {
        let message = EffectsSoundEvent {
            object_id: 1,
            sound: Sound::Death1,
            volume: 0.25,
        };
        let mut frags = BytesMut::new();
        fragment(&mut frags, 10, 1, 0, &message.to_bytes());
        let mut data = BytesMut::new();
        packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);

        let packets = collect(&mut reader(), Direction::ServerToClient, &data);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].direction, Direction::ServerToClient);
        assert_eq!(packets[0].messages.len(), 1);
        assert_eq!(packets[0].messages[0].type_name(), "Effects_SoundEvent");
    }

    #[test]
    fn test_multi_chunk_fragment_across_datagrams() {
        let message = OrderedGameAction {
            sequence: 1,
            action: GameAction::Talk {
                message: "x".repeat(600),
            },
        };
        let bytes = message.to_bytes();
        let (first, second) = bytes.split_at(FRAGMENT_CHUNK_SIZE);

        let mut reader = reader();

        let mut frags = BytesMut::new();
        fragment(&mut frags, 7, 2, 1, second);
        let mut data = BytesMut::new();
        packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);
        let packets = collect(&mut reader, Direction::ClientToServer, &data);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].messages.is_empty());
        assert_eq!(reader.incomplete_fragments(), 1);

        let mut frags = BytesMut::new();
        fragment(&mut frags, 7, 2, 0, first);
        let mut data = BytesMut::new();
        packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);
        let packets = collect(&mut reader, Direction::ClientToServer, &data);
        assert_eq!(packets[0].messages.len(), 1);
        assert_eq!(packets[0].messages[0].to_bytes(), bytes);
        assert_eq!(reader.client_fragments.pending(), 0);
    }

    #[test]
    fn test_optional_headers_are_skipped() {
        let mut frags = BytesMut::new();
        fragment(&mut frags, 3, 1, 0, &ItemServerSaysRemove { object_id: 9 }.to_bytes());

        let mut optional = BytesMut::new();
        // Request retransmit: two sequence numbers.
        optional.put_u32_le(2);
        optional.put_u32_le(100);
        optional.put_u32_le(101);
        // Ack sequence.
        optional.put_u32_le(55);
        // Time sync.
        optional.put_f64_le(1234.5);

        let flags = PacketHeaderFlags::BLOB_FRAGMENTS
            | PacketHeaderFlags::REQUEST_RETRANSMIT
            | PacketHeaderFlags::ACK_SEQUENCE
            | PacketHeaderFlags::TIME_SYNC;
        let mut data = BytesMut::new();
        packet(&mut data, flags, &optional, &frags);

        let packets = collect(&mut reader(), Direction::ServerToClient, &data);
        assert_eq!(packets[0].messages.len(), 1);
        assert_eq!(packets[0].messages[0].opcode(), ItemServerSaysRemove::OPCODE);
        assert_eq!(packets[0].header.flags, flags);
    }

    #[test]
    fn test_header_keeps_unknown_flag_bits() {
        let mut buf = BytesMut::new();
        packet(&mut buf, PacketHeaderFlags::from_bits_retain(0x8000_0004), &[], &[]);
        let header = PacketHeader::read(&mut buf.freeze()).unwrap();
        assert!(header.flags.contains(PacketHeaderFlags::BLOB_FRAGMENTS));
        assert_eq!(header.flags.bits(), 0x8000_0004);
    }

    #[test]
    fn test_several_packets_in_one_datagram() {
        let mut data = BytesMut::new();
        for (sequence, object_id) in [(1u32, 11u32), (2, 12)] {
            let mut frags = BytesMut::new();
            fragment(&mut frags, sequence, 1, 0, &ItemServerSaysRemove { object_id }.to_bytes());
            packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);
        }
        // An ack-only packet carries no messages.
        packet(&mut data, PacketHeaderFlags::ACK_SEQUENCE, &[1, 0, 0, 0], &[]);

        let packets = collect(&mut reader(), Direction::ServerToClient, &data);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].messages.len(), 1);
        assert_eq!(packets[1].messages.len(), 1);
        assert!(packets[2].messages.is_empty());
    }

    #[test]
    fn test_truncated_datagram_is_dropped() {
        let mut frags = BytesMut::new();
        fragment(&mut frags, 1, 1, 0, &ItemServerSaysRemove { object_id: 1 }.to_bytes());
        let mut data = BytesMut::new();
        packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);

        let packets = collect(&mut reader(), Direction::ServerToClient, &data[..data.len() - 2]);
        assert!(packets.is_empty());

        let packets = collect(&mut reader(), Direction::ServerToClient, &data[..10]);
        assert!(packets.is_empty());
    }

    #[test]
    fn test_fragment_header_validation() {
        let mut buf = BytesMut::new();
        fragment(&mut buf, 1, 1, 1, &[0u8; 4]);
        assert!(matches!(
            FragmentHeader::read(&mut buf.freeze()),
            Err(ProtocolError::InvalidFragment(_))
        ));

        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        buf.put_u32_le(1);
        buf.put_u16_le(1);
        buf.put_u16_le(8);
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        assert!(FragmentHeader::read(&mut buf.freeze()).is_err());
    }

    #[test]
    fn test_undecodable_message_is_kept_raw() {
        let mut body = BytesMut::new();
        body.put_u32_le(EffectsSoundEvent::OPCODE);
        body.put_u32_le(1);
        let mut frags = BytesMut::new();
        fragment(&mut frags, 4, 1, 0, &body);
        let mut data = BytesMut::new();
        packet(&mut data, PacketHeaderFlags::BLOB_FRAGMENTS, &[], &frags);

        let packets = collect(&mut reader(), Direction::ServerToClient, &data);
        let message = &packets[0].messages[0];
        assert_eq!(message.type_name(), "Effects_SoundEvent");
        assert_eq!(message.to_bytes(), body.freeze());
    }
}
