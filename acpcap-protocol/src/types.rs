//! Shared type definitions: directions, opcodes, identifier tables and wire enums.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Opcode of the server-to-client ordered wrapper.
pub const ORDERED_GAME_EVENT: u32 = 0xF7B0;

/// Opcode of the client-to-server ordered wrapper.
pub const ORDERED_GAME_ACTION: u32 = 0xF7B1;

/// Registry name of the server-to-client ordered wrapper.
pub const ORDERED_GAME_EVENT_NAME: &str = "Ordered_GameEvent";

/// Registry name of the client-to-server ordered wrapper.
pub const ORDERED_GAME_ACTION_NAME: &str = "Ordered_GameAction";

/// Registry name of the wrapper type that decodes `opcode`, if it is an ordered wrapper.
pub fn ordered_wrapper_name(opcode: u32) -> Option<&'static str> {
    match opcode {
        ORDERED_GAME_EVENT => Some(ORDERED_GAME_EVENT_NAME),
        ORDERED_GAME_ACTION => Some(ORDERED_GAME_ACTION_NAME),
        _ => None,
    }
}

/// Direction a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the client.
    ClientToServer,
    /// Sent by the server.
    ServerToClient,
}

impl Direction {
    /// Token used in artifact filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "ClientToServer",
            Direction::ServerToClient => "ServerToClient",
        }
    }

    /// Short form used in log lines.
    pub fn short(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "C2S",
            Direction::ServerToClient => "S2C",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a direction token is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown direction '{0}'")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClientToServer" | "C2S" => Ok(Direction::ClientToServer),
            "ServerToClient" | "S2C" => Ok(Direction::ServerToClient),
            _ => Err(UnknownDirection(s.to_string())),
        }
    }
}

/// A closed name to numeric identifier mapping for one ordered family.
///
/// Lookups ignore ASCII case.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierTable {
    /// Family name, for diagnostics.
    pub family: &'static str,
    entries: &'static [(&'static str, u32)],
}

impl IdentifierTable {
    /// Create a table from a static list of entries.
    pub const fn new(family: &'static str, entries: &'static [(&'static str, u32)]) -> Self {
        Self { family, entries }
    }

    /// Identifier for `name`.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|&(_, id)| id)
    }

    /// Name for `id`.
    pub fn name_of(&self, id: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|&&(_, entry)| entry == id)
            .map(|&(name, _)| name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Server-to-client ordered event identifiers (carried inside 0xF7B0).
pub const GAME_EVENT_IDS: IdentifierTable = IdentifierTable::new(
    "GameEvent",
    &[
        ("Allegiance_AllegianceUpdateAborted", 0x0003),
        ("Communication_PopUpString", 0x0004),
        ("Login_PlayerDescription", 0x0013),
        ("Allegiance_AllegianceUpdate", 0x0020),
        ("Social_FriendsUpdate", 0x0021),
        ("Item_ServerSaysContainId", 0x0022),
        ("Item_WearItem", 0x0023),
        ("Social_CharacterTitleTable", 0x0029),
        ("Social_AddOrSetCharacterTitle", 0x002B),
        ("Item_StopViewingObjectContents", 0x0052),
        ("Vendor_VendorInfo", 0x0062),
        ("Character_StartBarber", 0x0075),
        ("Fellowship_Quit", 0x00A3),
        ("Fellowship_Dismiss", 0x00A4),
        ("Writing_BookOpen", 0x00B4),
        ("Item_GetInscriptionResponse", 0x00C3),
        ("Item_SetAppraiseInfo", 0x00C9),
        ("Item_UseDone", 0x01C7),
        ("Character_ReturnPing", 0x01EA),
        ("Trade_ResetTrade", 0x0205),
        ("Game_MoveResponse", 0x0283),
        ("Fellowship_Disband", 0x02BF),
        ("Misc_PortalStormBrewing", 0x02C9),
        ("Misc_PortalStormImminent", 0x02CA),
        ("Misc_PortalStorm", 0x02CB),
        ("Misc_PortalStormSubsided", 0x02CC),
    ],
);

/// Client-to-server ordered action identifiers (carried inside 0xF7B1).
pub const GAME_ACTION_IDS: IdentifierTable = IdentifierTable::new(
    "GameAction",
    &[
        ("Communication_SetAFKMode", 0x000F),
        ("Communication_SetAFKMessage", 0x0010),
        ("Communication_Talk", 0x0015),
        ("Communication_TalkDirect", 0x0032),
        ("Train_TrainSkill", 0x0046),
        ("Train_TrainSkillAdvancementClass", 0x0047),
        ("Character_RequestPing", 0x01E9),
        ("Trade_ResetTrade", 0x0204),
        ("Game_Quit", 0x026A),
        ("Game_MovePass", 0x026D),
        ("Character_Suicide", 0x0279),
    ],
);

/// The two identifier tables handed to artifact naming.
#[derive(Debug, Clone, Copy)]
pub struct OrderedIdentifiers {
    /// Table consulted for 0xF7B0.
    pub game_events: IdentifierTable,
    /// Table consulted for 0xF7B1.
    pub game_actions: IdentifierTable,
}

impl OrderedIdentifiers {
    /// Table for an ordered wrapper opcode.
    pub fn table_for(&self, opcode: u32) -> Option<&IdentifierTable> {
        match opcode {
            ORDERED_GAME_EVENT => Some(&self.game_events),
            ORDERED_GAME_ACTION => Some(&self.game_actions),
            _ => None,
        }
    }
}

impl Default for OrderedIdentifiers {
    fn default() -> Self {
        Self {
            game_events: GAME_EVENT_IDS,
            game_actions: GAME_ACTION_IDS,
        }
    }
}

/// Behaviour shared by the enumerated field types.
pub trait WireEnum: Copy {
    /// Type name used in diagnostics.
    const KIND: &'static str;

    /// Symbolic name of the value.
    fn name(&self) -> &'static str;

    /// Numeric value on the wire.
    fn value(&self) -> u32;
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant = $value,
            )+
        }

        impl WireEnum for $name {
            const KIND: &'static str = stringify!($name);

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }

            fn value(&self) -> u32 {
                *self as u32
            }
        }

        impl TryFrom<u32> for $name {
            type Error = crate::error::ProtocolError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(crate::error::ProtocolError::InvalidEnumValue {
                        kind: stringify!($name),
                        value,
                    }),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value as u32
            }
        }
    };
}

wire_enum! {
    /// Sound effect played by an object.
    Sound {
        Invalid = 0x0,
        Speak1 = 0x1,
        Random = 0x2,
        Attack1 = 0x3,
        Attack2 = 0x4,
        Attack3 = 0x5,
        SpecialAttack1 = 0x6,
        SpecialAttack2 = 0x7,
        SpecialAttack3 = 0x8,
        Damage1 = 0x9,
        Damage2 = 0xA,
        Damage3 = 0xB,
        Wound1 = 0xC,
        Wound2 = 0xD,
        Wound3 = 0xE,
        Death1 = 0xF,
        Death2 = 0x10,
        Death3 = 0x11,
    }
}

wire_enum! {
    /// Chat channel a line of text belongs to.
    ChatMessageType {
        Default = 0x0,
        Speech = 0x2,
        Tell = 0x3,
        OutgoingTell = 0x4,
        System = 0x5,
        Combat = 0x6,
        Magic = 0x7,
        Channels = 0x8,
        OutgoingChannel = 0x9,
        Social = 0xA,
        OutgoingSocial = 0xB,
        Emote = 0xC,
        Advancement = 0xD,
        Abuse = 0xE,
        Help = 0xF,
        Appraisal = 0x10,
        Spellcasting = 0x11,
        Allegiance = 0x12,
        Fellowship = 0x13,
        WorldBroadcast = 0x14,
    }
}

wire_enum! {
    /// Failure reason reported by the server.
    WeenieError {
        None = 0x0,
        NoMem = 0x1,
        BadParam = 0x2,
        DivZero = 0x3,
        SegV = 0x4,
        Unimplemented = 0x5,
        UnknownMessageType = 0x6,
        NoAnimationTable = 0x7,
        NoPhysicsObject = 0x8,
        NoBookieObject = 0x9,
        NoWslObject = 0xA,
        NoMotionInterpreter = 0xB,
        UnhandledSwitch = 0xC,
        DefaultConstructorCalled = 0xD,
        InvalidCombatManeuver = 0xE,
        BadCast = 0xF,
        MissingQuality = 0x10,
        MissingDatabaseObject = 0x12,
        NoCallbackSet = 0x13,
        CorruptQuality = 0x14,
        BadContext = 0x15,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_direction_tokens() {
        assert_eq!(Direction::ClientToServer.to_string(), "ClientToServer");
        assert_eq!("ServerToClient".parse::<Direction>(), Ok(Direction::ServerToClient));
        assert_eq!("C2S".parse::<Direction>(), Ok(Direction::ClientToServer));
        let err = "Sideways".parse::<Direction>().unwrap_err();
        assert_eq!(err.to_string(), "unknown direction 'Sideways'");
    }

    #[test]
    fn test_identifier_lookup_ignores_case() {
        assert_eq!(GAME_EVENT_IDS.lookup("Character_ReturnPing"), Some(0x01EA));
        assert_eq!(GAME_EVENT_IDS.lookup("character_returnping"), Some(0x01EA));
        assert_eq!(GAME_EVENT_IDS.lookup("Character_RequestPing"), None);
        assert_eq!(GAME_ACTION_IDS.lookup("Character_RequestPing"), Some(0x01E9));
        assert_eq!(GAME_ACTION_IDS.name_of(0x0279), Some("Character_Suicide"));
    }

    #[test]
    fn test_table_for_wrapper() {
        let ids = OrderedIdentifiers::default();
        assert_eq!(ids.table_for(ORDERED_GAME_EVENT).unwrap().family, "GameEvent");
        assert_eq!(ids.table_for(ORDERED_GAME_ACTION).unwrap().family, "GameAction");
        assert!(ids.table_for(0xF750).is_none());
    }

    #[test]
    fn test_ordered_wrapper_name() {
        assert_eq!(ordered_wrapper_name(0xF7B0), Some("Ordered_GameEvent"));
        assert_eq!(ordered_wrapper_name(0xF7B1), Some("Ordered_GameAction"));
        assert_eq!(ordered_wrapper_name(0xF7B2), None);
    }

    #[test]
    fn test_wire_enum_conversion() {
        assert_eq!(Sound::try_from(0x3), Ok(Sound::Attack1));
        assert_eq!(Sound::Attack1.name(), "Attack1");
        assert_eq!(u32::from(ChatMessageType::Tell), 3);
        assert_eq!(
            WeenieError::try_from(0x11),
            Err(ProtocolError::InvalidEnumValue {
                kind: "WeenieError",
                value: 0x11
            })
        );
    }
}
