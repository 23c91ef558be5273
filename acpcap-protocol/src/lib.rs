//! Message codec for the Asheron's Call client/server protocol.
//!
//! This crate turns UDP payloads into typed messages and back:
//!
//! - [`packet`]: transport packets, optional headers and blob fragment reassembly
//! - [`messages`] and [`ordered`]: message types with their binary read/write
//! - [`registry`]: the table of known message types, looked up by name or opcode
//! - [`describe`]: field listing used to print decoded messages generically
//!
//! # Message Format
//!
//! ```text
//! +--------+------------------+
//! | Opcode |       Body       |
//! | u32 LE |    (variable)    |
//! +--------+------------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use acpcap_protocol::{Direction, Message, MessageRegistry, ItemServerSaysRemove};
//!
//! let registry = MessageRegistry::builtin().unwrap();
//!
//! // Encode a message
//! let encoded = ItemServerSaysRemove { object_id: 0x5000_0001 }.to_bytes();
//!
//! // Decode it again by opcode
//! let decoded = registry.decode_message(Direction::ServerToClient, encoded).unwrap();
//! assert_eq!(decoded.type_name(), "Item_ServerSaysRemove");
//! ```

pub mod codec;
pub mod describe;
pub mod error;
pub mod messages;
pub mod ordered;
pub mod packet;
pub mod registry;
pub mod types;

pub use describe::{Describe, Field, FieldError, FieldValue, Namespace, NodeId, Scalar};
pub use error::ProtocolError;
pub use messages::{
    AdminSendAdminGetServerVersion, CharacterCharacterDelete, CharacterIdentity,
    CommunicationHearSpeech, EffectsSoundEvent, ItemDeleteObject, ItemServerSaysRemove,
    LoginEnterGameServerReady, LoginLogOffCharacter, LoginLoginCharacterSet,
    LoginSendEnterWorldRequest, Message, MessageBody, OpaqueMessage, QualitiesUpdateInt,
    UnknownMessage,
};
pub use ordered::{GameAction, GameEvent, OrderedGameAction, OrderedGameEvent};
pub use packet::{
    FragmentAssembler, FragmentHeader, Packet, PacketHeader, PacketHeaderFlags, PacketReader,
    FRAGMENT_CHUNK_SIZE,
};
pub use registry::{DecodeFn, MessageKind, MessageRegistry};
pub use types::{
    ordered_wrapper_name, ChatMessageType, Direction, IdentifierTable,
    OrderedIdentifiers, Sound, WeenieError, WireEnum, GAME_ACTION_IDS, GAME_EVENT_IDS,
    ORDERED_GAME_ACTION, ORDERED_GAME_ACTION_NAME, ORDERED_GAME_EVENT, ORDERED_GAME_EVENT_NAME,
};
