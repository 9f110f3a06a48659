//! Namespaced identifiers and block states.
//!
//! Blocks travel as strings of the form `namespace:id[key=value,...]`, for
//! example `minecraft:oak_stairs[facing=north,half=bottom]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CraftError;

/// A `namespace:id` pair such as `minecraft:stone`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Namespace, e.g. `minecraft`.
    pub namespace: String,
    /// Path inside the namespace, e.g. `stone_sword`.
    pub id: String,
}

impl Identifier {
    /// Create an identifier from its parts.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for Identifier {
    type Err = CraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(id), None) => Ok(Self::new(namespace, id)),
            _ => Err(CraftError::InvalidIdentifier(s.to_string())),
        }
    }
}

/// A block identifier together with its state properties.
///
/// States keep the order in which they were parsed or added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block identifier.
    pub identifier: Identifier,
    /// State properties, e.g. `facing=north`.
    pub states: Vec<(String, String)>,
}

impl Block {
    /// A stateless block.
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            states: Vec::new(),
        }
    }

    /// `minecraft:air`, used to clear a location.
    pub fn air() -> Self {
        Self::new(Identifier::new("minecraft", "air"))
    }

    /// Builder-style state setter.
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.states.push((key.into(), value.into()));
        self
    }

    /// Value of a state property.
    pub fn state(&self, key: &str) -> Option<&str> {
        self.states
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        if !self.states.is_empty() {
            f.write_str("[")?;
            for (i, (key, value)) in self.states.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl FromStr for Block {
    type Err = CraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, states) = match s.split_once('[') {
            None => (s, None),
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(']')
                    .filter(|inner| !inner.contains(['[', ']']))
                    .ok_or_else(|| CraftError::InvalidBlock(s.to_string()))?;
                (name, Some(inner))
            }
        };

        let identifier = name
            .parse::<Identifier>()
            .map_err(|_| CraftError::InvalidBlock(s.to_string()))?;

        // Malformed `key=value` pairs are skipped, not rejected.
        let states = states
            .into_iter()
            .flat_map(|inner| inner.split(','))
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self { identifier, states })
    }
}

impl Serialize for Block {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a watched or polled block changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockUpdateCause {
    /// Detected by polling.
    Poll,
    /// Burned away.
    Burn,
    /// Broken.
    Break,
    /// Destroyed by an explosion.
    Explode,
    /// Faded (ice melting, coral dying).
    Fade,
    /// Grew.
    Grow,
    /// Set on fire.
    Ignite,
    /// Moved by an extending piston.
    PistonExtend,
    /// Moved by a retracting piston.
    PistonRetract,
    /// Placed.
    Place,
    /// Changed by flowing fluid.
    Fluid,
    /// Decayed (leaves).
    Decay,
    /// Changed by redstone.
    Redstone,
    /// A cause this client does not know about.
    #[serde(other)]
    Unknown,
}
