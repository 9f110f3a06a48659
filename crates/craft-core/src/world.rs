//! Coordinates, players, and entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionData;
use crate::errors::{CraftError, Result};

/// Block coordinates relative to the structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl Location {
    /// Create a location from its coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Request fields for this location, each key prefixed with `prefix`.
    ///
    /// `Location::new(1, 2, 3).to_fields("target_")` yields
    /// `{"target_x": 1, "target_y": 2, "target_z": 3}`.
    pub fn to_fields(&self, prefix: &str) -> ActionData {
        let mut data = ActionData::new();
        let _ = data.insert(format!("{prefix}x"), Value::from(self.x));
        let _ = data.insert(format!("{prefix}y"), Value::from(self.y));
        let _ = data.insert(format!("{prefix}z"), Value::from(self.z));
        data
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Location of a block in a named world.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldLocation {
    /// Name of the world.
    pub world: String,
    /// Coordinates inside the world.
    #[serde(flatten)]
    pub location: Location,
}

impl fmt::Display for WorldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.world, self.location)
    }
}

/// Free-floating position, used for entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// A player, known by name, UUID, or both.
#[derive(Clone, Debug)]
pub struct Player {
    name: Option<String>,
    uuid: Option<String>,
}

impl Player {
    /// Create a player. At least one of `name` and `uuid` is required.
    pub fn new(name: Option<String>, uuid: Option<String>) -> Result<Self> {
        if name.is_none() && uuid.is_none() {
            return Err(CraftError::InvalidPlayer);
        }
        Ok(Self { name, uuid })
    }

    /// Player known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            uuid: None,
        }
    }

    /// Player name, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Player UUID, if known.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Player {}

impl fmt::Display for Player {
    /// The UUID when known, the name otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.uuid, &self.name) {
            (Some(uuid), _) => f.write_str(uuid),
            (None, Some(name)) => f.write_str(name),
            (None, None) => Ok(()),
        }
    }
}

/// Entity record as sent by the server.
#[derive(Debug, Deserialize)]
struct EntityData {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    player_uuid: Option<String>,
    health: f64,
    max_health: f64,
    x: f64,
    y: f64,
    z: f64,
}

/// An entity inside the structure.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "EntityData")]
pub struct Entity {
    /// Entity type, e.g. `PLAYER`.
    pub kind: String,
    /// Display name.
    pub name: String,
    /// The player behind this entity, for player entities.
    pub player: Option<Player>,
    /// Current health.
    pub health: f64,
    /// Maximum health.
    pub max_health: f64,
    /// Where the entity is.
    pub position: Position,
}

impl From<EntityData> for Entity {
    fn from(data: EntityData) -> Self {
        let player = data.player_uuid.map(|uuid| Player {
            name: Some(data.name.clone()),
            uuid: Some(uuid),
        });
        Self {
            kind: data.kind,
            name: data.name,
            player,
            health: data.health,
            max_health: data.max_health,
            position: Position {
                x: data.x,
                y: data.y,
                z: data.z,
            },
        }
    }
}
