//! Registration table of the known message types.

use std::collections::HashMap;

use bytes::{Buf, Bytes};
use log::debug;

use crate::codec::get_u32;
use crate::error::ProtocolError;
use crate::messages::{
    AdminSendAdminGetServerVersion, CharacterCharacterDelete, CommunicationHearSpeech,
    EffectsSoundEvent, ItemDeleteObject, ItemServerSaysRemove, LoginEnterGameServerReady,
    LoginLogOffCharacter, LoginLoginCharacterSet, LoginSendEnterWorldRequest, Message,
    MessageBody, OpaqueMessage, QualitiesUpdateInt, UnknownMessage,
};
use crate::ordered::{OrderedGameAction, OrderedGameEvent};
use crate::types::Direction;

/// Reads a full message (opcode included) from a buffer.
pub type DecodeFn = fn(&mut Bytes) -> Result<Box<dyn Message>, ProtocolError>;

fn decode_boxed<T: MessageBody + 'static>(buf: &mut Bytes) -> Result<Box<dyn Message>, ProtocolError> {
    Ok(Box::new(T::read(buf)?))
}

/// One registered message type.
#[derive(Debug, Clone, Copy)]
pub struct MessageKind {
    pub name: &'static str,
    pub opcode: u32,
    pub direction: Direction,
    /// `None` for types that are known but have no reader.
    pub decode: Option<DecodeFn>,
}

impl MessageKind {
    /// Entry for a concrete message type.
    pub fn of<T: MessageBody + 'static>() -> Self {
        Self {
            name: T::NAME,
            opcode: T::OPCODE,
            direction: T::DIRECTION,
            decode: Some(decode_boxed::<T>),
        }
    }

    /// Entry for a known type without a reader.
    pub const fn opaque(name: &'static str, opcode: u32, direction: Direction) -> Self {
        Self {
            name,
            opcode,
            direction,
            decode: None,
        }
    }
}

/// Name and opcode lookup over the message types.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    by_name: HashMap<String, MessageKind>,
    by_opcode: HashMap<(Direction, u32), &'static str>,
}

impl MessageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of every message type this crate knows.
    pub fn builtin() -> Result<Self, ProtocolError> {
        let mut registry = Self::new();
        for kind in [
            MessageKind::of::<ItemServerSaysRemove>(),
            MessageKind::of::<CommunicationHearSpeech>(),
            MessageKind::of::<QualitiesUpdateInt>(),
            MessageKind::of::<LoginLogOffCharacter>(),
            MessageKind::of::<CharacterCharacterDelete>(),
            MessageKind::of::<LoginLoginCharacterSet>(),
            MessageKind::of::<ItemDeleteObject>(),
            MessageKind::of::<EffectsSoundEvent>(),
            MessageKind::of::<OrderedGameEvent>(),
            MessageKind::of::<OrderedGameAction>(),
            MessageKind::of::<LoginSendEnterWorldRequest>(),
            MessageKind::of::<AdminSendAdminGetServerVersion>(),
            MessageKind::of::<LoginEnterGameServerReady>(),
            MessageKind::opaque("Communication_TurbineChat", 0xF7DE, Direction::ClientToServer),
            MessageKind::opaque("Login_WorldInfo", 0xF7E1, Direction::ServerToClient),
            MessageKind::opaque("DDD_InterrogationMessage", 0xF7E5, Direction::ServerToClient),
        ] {
            registry.register(kind)?;
        }
        Ok(registry)
    }

    /// Add a message type. Names must be unique, ignoring case.
    pub fn register(&mut self, kind: MessageKind) -> Result<(), ProtocolError> {
        let key = kind.name.to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(ProtocolError::DuplicateMessageType(kind.name.to_string()));
        }
        self.by_opcode.insert((kind.direction, kind.opcode), kind.name);
        self.by_name.insert(key, kind);
        Ok(())
    }

    /// Look a type up by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&MessageKind> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    /// Look a type up by its direction and opcode.
    pub fn kind_for(&self, direction: Direction, opcode: u32) -> Option<&MessageKind> {
        self.by_opcode
            .get(&(direction, opcode))
            .and_then(|name| self.find(name))
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Registered types, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = &MessageKind> {
        self.by_name.values()
    }

    /// Decode one reassembled message seen travelling in `direction`.
    ///
    /// Registered types without a reader and unregistered opcodes come back
    /// as opaque messages holding the raw body.
    pub fn decode_message(
        &self,
        direction: Direction,
        data: Bytes,
    ) -> Result<Box<dyn Message>, ProtocolError> {
        let mut body = data.clone();
        let opcode = get_u32(&mut body)?;

        let Some(kind) = self.kind_for(direction, opcode) else {
            debug!("unregistered {} opcode 0x{:04X}", direction.short(), opcode);
            return Ok(Box::new(UnknownMessage {
                opcode,
                direction,
                body,
            }));
        };

        let Some(decode) = kind.decode else {
            return Ok(Box::new(OpaqueMessage {
                name: kind.name,
                opcode,
                direction,
                body,
            }));
        };

        let mut input = data;
        let message = decode(&mut input)?;
        if input.has_remaining() {
            debug!(
                "{}: {} trailing bytes ignored",
                kind.name,
                input.remaining()
            );
        }
        Ok(message)
    }

    /// Keep a message as raw bytes, named after its registered type when there is one.
    ///
    /// Returns `None` when the data is too short to hold an opcode.
    pub fn raw_message(&self, direction: Direction, data: Bytes) -> Option<Box<dyn Message>> {
        let mut body = data;
        let opcode = get_u32(&mut body).ok()?;
        let message: Box<dyn Message> = match self.kind_for(direction, opcode) {
            Some(kind) => Box::new(OpaqueMessage {
                name: kind.name,
                opcode,
                direction,
                body,
            }),
            None => Box::new(UnknownMessage {
                opcode,
                direction,
                body,
            }),
        };
        Some(message)
    }
}
