//! Ordered wrapper messages.
//!
//! The server wraps game events in 0xF7B0 and the client wraps game actions in
//! 0xF7B1. The real identity of such a message is the inner event or action
//! type carried after the wrapper header:
//!
//! ```text
//! 0xF7B0: opcode | object id | sequence | event type  | event body
//! 0xF7B1: opcode | sequence  | action type | action body
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{get_bool, get_bytes, get_string, get_u32, put_bool, put_string};
use crate::describe::{Describe, Field, FieldValue};
use crate::error::ProtocolError;
use crate::messages::MessageBody;
use crate::types::{
    Direction, WeenieError, GAME_ACTION_IDS, GAME_EVENT_IDS, ORDERED_GAME_ACTION,
    ORDERED_GAME_ACTION_NAME, ORDERED_GAME_EVENT, ORDERED_GAME_EVENT_NAME,
};

/// Body of an 0xF7B0 wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Display a message in a popup box.
    PopUpString { message: String },
    /// An item use finished.
    UseDone { failure: WeenieError },
    /// Ping reply.
    ReturnPing,
    /// The fellowship was disbanded.
    FellowshipDisband,
    /// An event type without a reader.
    Unknown { event_type: u32, body: Bytes },
}

impl GameEvent {
    /// Numeric event type.
    pub fn event_type(&self) -> u32 {
        match self {
            GameEvent::PopUpString { .. } => 0x0004,
            GameEvent::UseDone { .. } => 0x01C7,
            GameEvent::ReturnPing => 0x01EA,
            GameEvent::FellowshipDisband => 0x02BF,
            GameEvent::Unknown { event_type, .. } => *event_type,
        }
    }

    /// Event name, or the wrapper name when the type is not in the event table.
    pub fn name(&self) -> &'static str {
        GAME_EVENT_IDS
            .name_of(self.event_type())
            .unwrap_or(ORDERED_GAME_EVENT_NAME)
    }

    fn read(event_type: u32, buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let event = match event_type {
            0x0004 => GameEvent::PopUpString {
                message: get_string(buf)?,
            },
            0x01C7 => GameEvent::UseDone {
                failure: WeenieError::try_from(get_u32(buf)?)?,
            },
            0x01EA => GameEvent::ReturnPing,
            0x02BF => GameEvent::FellowshipDisband,
            _ => {
                let len = buf.len();
                GameEvent::Unknown {
                    event_type,
                    body: get_bytes(buf, len)?,
                }
            }
        };
        Ok(event)
    }

    fn write(&self, buf: &mut BytesMut) {
        match self {
            GameEvent::PopUpString { message } => put_string(buf, message),
            GameEvent::UseDone { failure } => buf.put_u32_le((*failure).into()),
            GameEvent::ReturnPing | GameEvent::FellowshipDisband => {}
            GameEvent::Unknown { body, .. } => buf.put_slice(body),
        }
    }
}

impl Describe for GameEvent {
    fn fields(&self) -> Vec<Field<'_>> {
        match self {
            GameEvent::PopUpString { message } => vec![Field::new("Message", message)],
            GameEvent::UseDone { failure } => {
                vec![Field::new("FailureType", FieldValue::from_enum(*failure))]
            }
            GameEvent::ReturnPing | GameEvent::FellowshipDisband => Vec::new(),
            GameEvent::Unknown { body, .. } => vec![
                Field::new("Length", body.len() as u64),
                Field::new(
                    "Data",
                    FieldValue::Sequence(body.iter().map(|&b| FieldValue::from(b)).collect()),
                ),
            ],
        }
    }
}

/// Server-to-client ordered wrapper (0xF7B0).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedGameEvent {
    pub object_id: u32,
    pub sequence: u32,
    pub event: GameEvent,
}

impl MessageBody for OrderedGameEvent {
    const OPCODE: u32 = ORDERED_GAME_EVENT;
    const NAME: &'static str = ORDERED_GAME_EVENT_NAME;
    const DIRECTION: Direction = Direction::ServerToClient;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let object_id = get_u32(buf)?;
        let sequence = get_u32(buf)?;
        let event_type = get_u32(buf)?;
        Ok(Self {
            object_id,
            sequence,
            event: GameEvent::read(event_type, buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.object_id);
        buf.put_u32_le(self.sequence);
        buf.put_u32_le(self.event.event_type());
        self.event.write(buf);
    }

    fn artifact_name(&self) -> &str {
        self.event.name()
    }
}

impl Describe for OrderedGameEvent {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("ObjectId", self.object_id),
            Field::new("Sequence", self.sequence),
            Field::new("EventType", self.event.event_type()),
            Field::new("Event", FieldValue::composite(&self.event)),
        ]
    }
}

/// Body of an 0xF7B1 wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    /// Toggle away-from-keyboard mode.
    SetAfkMode { afk: bool },
    /// Say something in local chat.
    Talk { message: String },
    /// Ping request.
    RequestPing,
    /// Kill the player character.
    Suicide,
    /// An action type without a reader.
    Unknown { action_type: u32, body: Bytes },
}

impl GameAction {
    /// Numeric action type.
    pub fn action_type(&self) -> u32 {
        match self {
            GameAction::SetAfkMode { .. } => 0x000F,
            GameAction::Talk { .. } => 0x0015,
            GameAction::RequestPing => 0x01E9,
            GameAction::Suicide => 0x0279,
            GameAction::Unknown { action_type, .. } => *action_type,
        }
    }

    /// Action name, or the wrapper name when the type is not in the action table.
    pub fn name(&self) -> &'static str {
        GAME_ACTION_IDS
            .name_of(self.action_type())
            .unwrap_or(ORDERED_GAME_ACTION_NAME)
    }

    fn read(action_type: u32, buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let action = match action_type {
            0x000F => GameAction::SetAfkMode {
                afk: get_bool(buf)?,
            },
            0x0015 => GameAction::Talk {
                message: get_string(buf)?,
            },
            0x01E9 => GameAction::RequestPing,
            0x0279 => GameAction::Suicide,
            _ => {
                let len = buf.len();
                GameAction::Unknown {
                    action_type,
                    body: get_bytes(buf, len)?,
                }
            }
        };
        Ok(action)
    }

    fn write(&self, buf: &mut BytesMut) {
        match self {
            GameAction::SetAfkMode { afk } => put_bool(buf, *afk),
            GameAction::Talk { message } => put_string(buf, message),
            GameAction::RequestPing | GameAction::Suicide => {}
            GameAction::Unknown { body, .. } => buf.put_slice(body),
        }
    }
}

impl Describe for GameAction {
    fn fields(&self) -> Vec<Field<'_>> {
        match self {
            GameAction::SetAfkMode { afk } => vec![Field::new("AFK", *afk)],
            GameAction::Talk { message } => vec![Field::new("Message", message)],
            GameAction::RequestPing | GameAction::Suicide => Vec::new(),
            GameAction::Unknown { body, .. } => vec![
                Field::new("Length", body.len() as u64),
                Field::new(
                    "Data",
                    FieldValue::Sequence(body.iter().map(|&b| FieldValue::from(b)).collect()),
                ),
            ],
        }
    }
}

/// Client-to-server ordered wrapper (0xF7B1).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedGameAction {
    pub sequence: u32,
    pub action: GameAction,
}

impl MessageBody for OrderedGameAction {
    const OPCODE: u32 = ORDERED_GAME_ACTION;
    const NAME: &'static str = ORDERED_GAME_ACTION_NAME;
    const DIRECTION: Direction = Direction::ClientToServer;

    fn read_body(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let sequence = get_u32(buf)?;
        let action_type = get_u32(buf)?;
        Ok(Self {
            sequence,
            action: GameAction::read(action_type, buf)?,
        })
    }

    fn write_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.sequence);
        buf.put_u32_le(self.action.action_type());
        self.action.write(buf);
    }

    fn artifact_name(&self) -> &str {
        self.action.name()
    }
}

impl Describe for OrderedGameAction {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("Sequence", self.sequence),
            Field::new("ActionType", self.action.action_type()),
            Field::new("Action", FieldValue::composite(&self.action)),
        ]
    }
}
