//! Top-level protocol messages.
//!
//! Every message on the wire starts with its `u32` opcode. A message type
//! implements [`MessageBody`] for the part that follows the opcode; the
//! blanket impl turns it into a [`Message`] that can be stored as a trait
//! object and written back out.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{
    expect_opcode, get_bool, get_f32, get_i32, get_list, get_string, get_u16, get_u32, get_u8,
    put_bool, put_list, put_string,
};
use crate::describe::{Describe, Field, FieldValue};
use crate::error::ProtocolError;
use crate::types::{ChatMessageType, Direction, Sound};

/// A decoded message, whatever its concrete type.
pub trait Message: Describe + fmt::Debug + Send {
    /// Wire opcode.
    fn opcode(&self) -> u32;

    /// Type name as used in artifact filenames.
    ///
    /// Ordered wrappers report the name of the event or action they carry.
    fn type_name(&self) -> &str;

    /// Direction the message travels in.
    fn direction(&self) -> Direction;

    /// Write the opcode followed by the body.
    fn write(&self, buf: &mut BytesMut);

    /// View as a describable value.
    fn as_describe(&self) -> &dyn Describe;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }
}

/// A concrete message type with a fixed opcode.
pub trait MessageBody: Describe + fmt::Debug + Send + Sized {
    /// Wire opcode.
    const OPCODE: u32;
    /// Registry name.
    const NAME: &'static str;
    /// Direction the message travels in.
    const DIRECTION: Direction;

    /// Read the fields following the opcode.
    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError>;

    /// Write the fields following the opcode.
    fn write_body(&self, buf: &mut BytesMut);

    /// Name written into artifact filenames. Defaults to [`Self::NAME`].
    fn artifact_name(&self) -> &str {
        Self::NAME
    }

    /// Read a full message, opcode included.
    fn read(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        expect_opcode(buf, Self::OPCODE)?;
        Self::read_body(buf)
    }
}

impl<T: MessageBody> Message for T {
    fn opcode(&self) -> u32 {
        T::OPCODE
    }

    fn type_name(&self) -> &str {
        self.artifact_name()
    }

    fn direction(&self) -> Direction {
        T::DIRECTION
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(T::OPCODE);
        self.write_body(buf);
    }

    fn as_describe(&self) -> &dyn Describe {
        self
    }
}

/// Remove an object from the 3D world.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemServerSaysRemove {
    pub object_id: u32,
}

impl MessageBody for ItemServerSaysRemove {
    const OPCODE: u32 = 0x0024;
    const NAME: &'static str = "Item_ServerSaysRemove";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            object_id: get_u32(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.object_id);
    }
}

impl Describe for ItemServerSaysRemove {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::new("ObjectId", self.object_id)]
    }
}

/// A line of local chat heard by the player.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunicationHearSpeech {
    pub message: String,
    pub sender_name: String,
    pub sender_id: u32,
    pub chat_type: ChatMessageType,
}

impl MessageBody for CommunicationHearSpeech {
    const OPCODE: u32 = 0x02BB;
    const NAME: &'static str = "Communication_HearSpeech";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            message: get_string(buf)?,
            sender_name: get_string(buf)?,
            sender_id: get_u32(buf)?,
            chat_type: ChatMessageType::try_from(get_u32(buf)?)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        put_string(buf, &self.message);
        put_string(buf, &self.sender_name);
        buf.put_u32_le(self.sender_id);
        buf.put_u32_le(self.chat_type.into());
    }
}

impl Describe for CommunicationHearSpeech {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("Message", &self.message),
            Field::new("SenderName", &self.sender_name),
            Field::new("SenderId", self.sender_id),
            Field::new("Type", FieldValue::from_enum(self.chat_type)),
        ]
    }
}

/// Set an integer property of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitiesUpdateInt {
    pub sequence: u8,
    pub object_id: u32,
    pub key: u32,
    pub value: i32,
}

impl MessageBody for QualitiesUpdateInt {
    const OPCODE: u32 = 0x02CE;
    const NAME: &'static str = "Qualities_UpdateInt";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            sequence: get_u8(buf)?,
            object_id: get_u32(buf)?,
            key: get_u32(buf)?,
            value: get_i32(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u8(self.sequence);
        buf.put_u32_le(self.object_id);
        buf.put_u32_le(self.key);
        buf.put_i32_le(self.value);
    }
}

impl Describe for QualitiesUpdateInt {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("Sequence", self.sequence),
            Field::new("ObjectId", self.object_id),
            Field::new("Key", self.key),
            Field::new("Value", self.value),
        ]
    }
}

/// Log the current character off.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginLogOffCharacter {
    pub character_id: u32,
}

impl MessageBody for LoginLogOffCharacter {
    const OPCODE: u32 = 0xF653;
    const NAME: &'static str = "Login_LogOffCharacter";
    const DIRECTION: Direction = Direction::ClientToServer;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            character_id: get_u32(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.character_id);
    }
}

impl Describe for LoginLogOffCharacter {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::new("CharacterId", self.character_id)]
    }
}

/// Mark a character slot for deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterCharacterDelete {
    pub account: String,
    pub slot: i32,
}

impl MessageBody for CharacterCharacterDelete {
    const OPCODE: u32 = 0xF655;
    const NAME: &'static str = "Character_CharacterDelete";
    const DIRECTION: Direction = Direction::ClientToServer;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            account: get_string(buf)?,
            slot: get_i32(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        put_string(buf, &self.account);
        buf.put_i32_le(self.slot);
    }
}

impl Describe for CharacterCharacterDelete {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("Account", &self.account),
            Field::new("Slot", self.slot),
        ]
    }
}

/// One entry of the character selection list.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterIdentity {
    pub character_id: u32,
    pub name: String,
    pub seconds_greyed_out: u32,
}

impl CharacterIdentity {
    fn read(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            character_id: get_u32(buf)?,
            name: get_string(buf)?,
            seconds_greyed_out: get_u32(buf)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.character_id);
        put_string(buf, &self.name);
        buf.put_u32_le(self.seconds_greyed_out);
    }
}

impl Describe for CharacterIdentity {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("CharacterId", self.character_id),
            Field::new("Name", &self.name),
            Field::new("SecondsGreyedOut", self.seconds_greyed_out),
        ]
    }
}

/// The character selection list sent after login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginLoginCharacterSet {
    pub status: u32,
    pub characters: Vec<CharacterIdentity>,
    pub deleted_characters: Vec<CharacterIdentity>,
    pub allowed_slots: u32,
    pub account: String,
    pub use_turbine_chat: bool,
    pub has_throne_of_destiny: bool,
}

impl MessageBody for LoginLoginCharacterSet {
    const OPCODE: u32 = 0xF658;
    const NAME: &'static str = "Login_LoginCharacterSet";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: get_u32(buf)?,
            characters: get_list(buf, CharacterIdentity::read)?,
            deleted_characters: get_list(buf, CharacterIdentity::read)?,
            allowed_slots: get_u32(buf)?,
            account: get_string(buf)?,
            use_turbine_chat: get_bool(buf)?,
            has_throne_of_destiny: get_bool(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.status);
        put_list(buf, &self.characters, |b, c| c.write(b));
        put_list(buf, &self.deleted_characters, |b, c| c.write(b));
        buf.put_u32_le(self.allowed_slots);
        put_string(buf, &self.account);
        put_bool(buf, self.use_turbine_chat);
        put_bool(buf, self.has_throne_of_destiny);
    }
}

impl Describe for LoginLoginCharacterSet {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("Status", self.status),
            Field::new("Characters", FieldValue::sequence_of(&self.characters)),
            Field::new(
                "DeletedCharacters",
                FieldValue::sequence_of(&self.deleted_characters),
            ),
            Field::new("NumAllowedCharacters", self.allowed_slots),
            Field::new("Account", &self.account),
            Field::new("UseTurbineChat", self.use_turbine_chat),
            Field::new("HasThroneofDestiny", self.has_throne_of_destiny),
        ]
    }
}

/// Destroy an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDeleteObject {
    pub object_id: u32,
    pub instance_sequence: u16,
}

impl MessageBody for ItemDeleteObject {
    const OPCODE: u32 = 0xF747;
    const NAME: &'static str = "Item_DeleteObject";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            object_id: get_u32(buf)?,
            instance_sequence: get_u16(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.object_id);
        buf.put_u16_le(self.instance_sequence);
    }
}

impl Describe for ItemDeleteObject {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("ObjectId", self.object_id),
            Field::new("ObjectInstanceSequence", self.instance_sequence),
        ]
    }
}

/// Play a sound effect on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectsSoundEvent {
    pub object_id: u32,
    pub sound: Sound,
    pub volume: f32,
}

impl MessageBody for EffectsSoundEvent {
    const OPCODE: u32 = 0xF750;
    const NAME: &'static str = "Effects_SoundEvent";
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            object_id: get_u32(buf)?,
            sound: Sound::try_from(get_u32(buf)?)?,
            volume: get_f32(buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.object_id);
        buf.put_u32_le(self.sound.into());
        buf.put_f32_le(self.volume);
    }
}

impl Describe for EffectsSoundEvent {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("ObjectId", self.object_id),
            Field::new("SoundType", FieldValue::from_enum(self.sound)),
            Field::new("Volume", self.volume),
        ]
    }
}

macro_rules! empty_message {
    ($(#[$meta:meta])* $ty:ident, $opcode:literal, $name:literal, $direction:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $ty;

        impl MessageBody for $ty {
            const OPCODE: u32 = $opcode;
            const NAME: &'static str = $name;
            const DIRECTION: Direction = Direction::$direction;

            fn read_body(_buf: &mut Bytes) -> Result<Self, ProtocolError> {
                Ok(Self)
            }

            fn write_body(&self, _buf: &mut BytesMut) {}
        }

        impl Describe for $ty {
            fn fields(&self) -> Vec<Field<'_>> {
                Vec::new()
            }
        }
    };
}

empty_message!(
    /// Ask to enter the world with the selected character.
    LoginSendEnterWorldRequest,
    0xF7C8,
    "Login_SendEnterWorldRequest",
    ClientToServer
);

empty_message!(
    /// Ask the server for its version string.
    AdminSendAdminGetServerVersion,
    0xF7CC,
    "Admin_SendAdminGetServerVersion",
    ClientToServer
);

empty_message!(
    /// The server is ready for the client to enter the world.
    LoginEnterGameServerReady,
    0xF7DF,
    "Login_EnterGameServerReady",
    ServerToClient
);

/// A registered message type without a reader, kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueMessage {
    pub name: &'static str,
    pub opcode: u32,
    pub direction: Direction,
    /// Bytes following the opcode.
    pub body: Bytes,
}

/// A message whose opcode is not registered, kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    pub opcode: u32,
    pub direction: Direction,
    /// Bytes following the opcode.
    pub body: Bytes,
}

impl UnknownMessage {
    /// Type name used for unregistered opcodes.
    pub const NAME: &'static str = "UnknownMessage";
}

fn raw_fields(opcode: u32, body: &Bytes) -> Vec<Field<'_>> {
    vec![
        Field::new("OpCode", opcode),
        Field::new("Length", body.len() as u64),
        Field::new(
            "Data",
            FieldValue::Sequence(body.iter().map(|&b| FieldValue::from(b)).collect()),
        ),
    ]
}

impl OpaqueMessage {
    fn raw_name(&self) -> &'static str {
        self.name
    }
}

impl UnknownMessage {
    fn raw_name(&self) -> &'static str {
        Self::NAME
    }
}

macro_rules! raw_message {
    ($ty:ident) => {
        impl Message for $ty {
            fn opcode(&self) -> u32 {
                self.opcode
            }

            fn type_name(&self) -> &str {
                self.raw_name()
            }

            fn direction(&self) -> Direction {
                self.direction
            }

            fn write(&self, buf: &mut BytesMut) {
                buf.put_u32_le(self.opcode);
                buf.put_slice(&self.body);
            }

            fn as_describe(&self) -> &dyn Describe {
                self
            }
        }

        impl Describe for $ty {
            fn fields(&self) -> Vec<Field<'_>> {
                raw_fields(self.opcode, &self.body)
            }
        }
    };
}

raw_message!(OpaqueMessage);
raw_message!(UnknownMessage);
