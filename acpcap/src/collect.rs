//! Gathers decoded messages from both directions into one capture-ordered list.

use acpcap_protocol::{Direction, Message, MessageRegistry, PacketReader};
use log::trace;

use crate::capture::PayloadSink;

/// A decoded message with its position in the capture.
#[derive(Debug)]
pub struct SequencedMessage {
    /// Zero-based, shared by both directions.
    pub index: usize,
    pub direction: Direction,
    pub message: Box<dyn Message>,
}

/// Payload sink that runs a [`PacketReader`] and keeps every message it completes.
pub struct MessageCollector {
    reader: PacketReader,
    messages: Vec<SequencedMessage>,
    packets: u64,
}

impl MessageCollector {
    pub fn new(registry: MessageRegistry) -> Self {
        Self {
            reader: PacketReader::new(registry),
            messages: Vec::new(),
            packets: 0,
        }
    }

    /// Number of transport packets parsed so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Messages whose fragments never all arrived.
    pub fn incomplete_fragments(&self) -> usize {
        self.reader.incomplete_fragments()
    }

    pub fn messages(&self) -> &[SequencedMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<SequencedMessage> {
        self.messages
    }
}

impl PayloadSink for MessageCollector {
    fn push(&mut self, direction: Direction, payload: &[u8]) {
        let messages = &mut self.messages;
        let packets = &mut self.packets;
        let on_packet = |packet: acpcap_protocol::Packet| {
            *packets += 1;
            for message in packet.messages {
                let index = messages.len();
                trace!("#{} {} {}", index, direction.short(), message.type_name());
                messages.push(SequencedMessage {
                    index,
                    direction: packet.direction,
                    message,
                });
            }
        };
        match direction {
            Direction::ClientToServer => self.reader.handle_c2s_packet(payload, on_packet),
            Direction::ServerToClient => self.reader.handle_s2c_packet(payload, on_packet),
        }
    }
}
