//! The action vocabulary understood by the structure server.
//!
//! Every outbound frame names exactly one [`ActionType`] in its `action`
//! field. The wire names are stable `snake_case` strings.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{CraftError, Result};

/// Flat field map carried by requests and replies.
pub type ActionData = serde_json::Map<String, serde_json::Value>;

/// A named operation the server understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Authenticate the connection with a structure token.
    Authenticate,
    /// Keepalive round-trip. `ping` is accepted as a legacy spelling.
    #[serde(alias = "ping")]
    Heartbeat,
    /// Size of the structure.
    GetSize,
    /// World location of the structure.
    GetLocation,
    /// Block state at a location.
    GetBlock,
    /// Replace the block state at a location.
    SetBlock,
    /// Subscribe to block updates at a location.
    Watch,
    /// Cancel a block watch.
    Unwatch,
    /// Poll a location for block updates.
    Poll,
    /// Cancel a block poll.
    Unpoll,
    /// Send a private message to a player.
    Tell,
    /// Accept or deny a pending transaction.
    Respond,
    /// Entities inside the structure.
    GetEntities,
    /// Contents of a container.
    GetInventory,
    /// Move an item between containers.
    MoveItem,
    /// Fuel accounting for the token owner.
    #[serde(rename = "fuelinfo")]
    FuelInfo,
}

impl ActionType {
    /// Every action, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::Authenticate,
        Self::Heartbeat,
        Self::GetSize,
        Self::GetLocation,
        Self::GetBlock,
        Self::SetBlock,
        Self::Watch,
        Self::Unwatch,
        Self::Poll,
        Self::Unpoll,
        Self::Tell,
        Self::Respond,
        Self::GetEntities,
        Self::GetInventory,
        Self::MoveItem,
        Self::FuelInfo,
    ];

    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Heartbeat => "heartbeat",
            Self::GetSize => "get_size",
            Self::GetLocation => "get_location",
            Self::GetBlock => "get_block",
            Self::SetBlock => "set_block",
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
            Self::Poll => "poll",
            Self::Unpoll => "unpoll",
            Self::Tell => "tell",
            Self::Respond => "respond",
            Self::GetEntities => "get_entities",
            Self::GetInventory => "get_inventory",
            Self::MoveItem => "move_item",
            Self::FuelInfo => "fuelinfo",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = CraftError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "ping" {
            return Ok(Self::Heartbeat);
        }
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CraftError::Decode(format!("unknown action '{s}'")))
    }
}

/// Deserialize a successful reply payload into `T`.
///
/// Missing or mistyped fields become [`CraftError::Protocol`] tagged with
/// the action that produced the reply.
pub fn decode_reply<T: DeserializeOwned>(action: ActionType, data: ActionData) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(data))
        .map_err(|e| CraftError::protocol(action.as_str(), e.to_string()))
}
