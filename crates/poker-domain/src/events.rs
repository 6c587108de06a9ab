use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::action::{ActionKind, deserialize_legal_actions};
use crate::game::{Card, PlayerSeat};
use crate::ids::{DeviceId, RoomId, SocketId};
use crate::money::Chips;

/// One JSON frame on the event channel: `{"event": name, "data": payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RawFrame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    RegisterDevice {
        device_id: DeviceId,
    },
    CreateRoom {
        max_players: u8,
        initial_chips: Chips,
        small_blind: Chips,
        big_blind: Chips,
    },
    JoinRoom {
        room_id: RoomId,
        device_id: DeviceId,
        player_name: String,
    },
    StartGame {
        room_id: RoomId,
    },
    PlayerAction {
        action: ActionKind,
        amount: Chips,
    },
}

impl ClientCommand {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterDevice { .. } => "registerDevice",
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::StartGame { .. } => "startGame",
            Self::PlayerAction { .. } => "playerAction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    DeviceRegistered,
    RoomCreated,
    GameStateUpdate,
    GameStarted,
    HandStarted,
    FlopDealt,
    TurnDealt,
    RiverDealt,
    YourTurn,
    HandEnded,
    Error,
}

impl EventTag {
    pub const ALL: [Self; 11] = [
        Self::DeviceRegistered,
        Self::RoomCreated,
        Self::GameStateUpdate,
        Self::GameStarted,
        Self::HandStarted,
        Self::FlopDealt,
        Self::TurnDealt,
        Self::RiverDealt,
        Self::YourTurn,
        Self::HandEnded,
        Self::Error,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceRegistered => "deviceRegistered",
            Self::RoomCreated => "roomCreated",
            Self::GameStateUpdate => "gameStateUpdate",
            Self::GameStarted => "gameStarted",
            Self::HandStarted => "handStarted",
            Self::FlopDealt => "flopDealt",
            Self::TurnDealt => "turnDealt",
            Self::RiverDealt => "riverDealt",
            Self::YourTurn => "yourTurn",
            Self::HandEnded => "handEnded",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistered {
    pub device_id: DeviceId,
    #[serde(default)]
    pub socket_id: Option<SocketId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_id: RoomId,
}

/// Partial delta: absent fields mean "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<PlayerSeat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pot: Option<Chips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_bet: Option<Chips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_started: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsDealt {
    pub community_cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YourTurn {
    #[serde(deserialize_with = "deserialize_legal_actions")]
    pub available_actions: Vec<ActionKind>,
    #[serde(default)]
    pub call_amount: Chips,
    #[serde(default)]
    pub min_raise: Chips,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandEnded {
    #[serde(default, deserialize_with = "deserialize_winners")]
    pub winner: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pot: Option<Chips>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    DeviceRegistered(DeviceRegistered),
    RoomCreated(RoomCreated),
    GameStateUpdate(GameStateUpdate),
    GameStarted,
    HandStarted,
    FlopDealt(CardsDealt),
    TurnDealt(CardsDealt),
    RiverDealt(CardsDealt),
    YourTurn(YourTurn),
    HandEnded(HandEnded),
    Error(ServiceError),
}

impl ServerEvent {
    #[must_use]
    pub fn tag(&self) -> EventTag {
        match self {
            Self::DeviceRegistered(_) => EventTag::DeviceRegistered,
            Self::RoomCreated(_) => EventTag::RoomCreated,
            Self::GameStateUpdate(_) => EventTag::GameStateUpdate,
            Self::GameStarted => EventTag::GameStarted,
            Self::HandStarted => EventTag::HandStarted,
            Self::FlopDealt(_) => EventTag::FlopDealt,
            Self::TurnDealt(_) => EventTag::TurnDealt,
            Self::RiverDealt(_) => EventTag::RiverDealt,
            Self::YourTurn(_) => EventTag::YourTurn,
            Self::HandEnded(_) => EventTag::HandEnded,
            Self::Error(_) => EventTag::Error,
        }
    }

    /// `Ok(None)` for event names outside the contract.
    pub fn decode(frame: &RawFrame) -> Result<Option<Self>, serde_json::Error> {
        let Some(tag) = EventTag::from_name(&frame.event) else {
            return Ok(None);
        };
        let data = frame.data.clone();
        let event = match tag {
            EventTag::DeviceRegistered => Self::DeviceRegistered(serde_json::from_value(data)?),
            EventTag::RoomCreated => Self::RoomCreated(serde_json::from_value(data)?),
            EventTag::GameStateUpdate => {
                if data.is_null() {
                    Self::GameStateUpdate(GameStateUpdate::default())
                } else {
                    Self::GameStateUpdate(serde_json::from_value(data)?)
                }
            }
            EventTag::GameStarted => Self::GameStarted,
            EventTag::HandStarted => Self::HandStarted,
            EventTag::FlopDealt => Self::FlopDealt(serde_json::from_value(data)?),
            EventTag::TurnDealt => Self::TurnDealt(serde_json::from_value(data)?),
            EventTag::RiverDealt => Self::RiverDealt(serde_json::from_value(data)?),
            EventTag::YourTurn => Self::YourTurn(serde_json::from_value(data)?),
            EventTag::HandEnded => Self::HandEnded(serde_json::from_value(data)?),
            EventTag::Error => {
                if data.is_null() {
                    Self::Error(ServiceError {
                        message: String::new(),
                    })
                } else {
                    Self::Error(serde_json::from_value(data)?)
                }
            }
        };
        Ok(Some(event))
    }

    pub fn to_frame(&self) -> Result<RawFrame, serde_json::Error> {
        let data = match self {
            Self::DeviceRegistered(payload) => serde_json::to_value(payload)?,
            Self::RoomCreated(payload) => serde_json::to_value(payload)?,
            Self::GameStateUpdate(payload) => serde_json::to_value(payload)?,
            Self::GameStarted | Self::HandStarted => Value::Object(serde_json::Map::new()),
            Self::FlopDealt(payload) | Self::TurnDealt(payload) | Self::RiverDealt(payload) => {
                serde_json::to_value(payload)?
            }
            Self::YourTurn(payload) => serde_json::to_value(payload)?,
            Self::HandEnded(payload) => serde_json::to_value(payload)?,
            Self::Error(payload) => serde_json::to_value(payload)?,
        };
        Ok(RawFrame::new(self.tag().name(), data))
    }
}

fn winner_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => ["id", "deviceId", "name", "playerName"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// `winner` shows up as a bare id, an object, or an array of either.
fn deserialize_winners<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match &raw {
        Value::Array(items) => items.iter().filter_map(winner_id).collect(),
        Value::Null => Vec::new(),
        other => winner_id(other).into_iter().collect(),
    })
}
