//! Fuel accounting returned by the `fuelinfo` action.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::world::Location;

/// Fuel spent on one API route.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct FuelUsage {
    /// Fuel used in the past second.
    pub second: f64,
    /// Fuel used in the past minute.
    pub minute: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuelConnectionData {
    x: i32,
    y: i32,
    z: i32,
    structure: String,
    fuel_usage: BTreeMap<String, FuelUsage>,
}

/// One active connection to a structure of the token owner.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "FuelConnectionData")]
pub struct FuelConnection {
    /// Location of the structure.
    pub location: Location,
    /// Textual description of the structure. Format is not stable.
    pub structure: String,
    /// Fuel used per API route.
    pub usage: BTreeMap<String, FuelUsage>,
}

impl From<FuelConnectionData> for FuelConnection {
    fn from(data: FuelConnectionData) -> Self {
        Self {
            location: Location::new(data.x, data.y, data.z),
            structure: data.structure,
            usage: data.fuel_usage,
        }
    }
}

/// A fuel strategy and its reserve.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelStrategy {
    /// Strategy name.
    pub strategy: String,
    /// Fuel held in reserve.
    pub spare_fuel: f64,
}

/// Cost of calling one API route.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ApiCost {
    /// Normal cost.
    #[serde(rename = "baseFuelCost")]
    pub base: f64,
    /// Current cost.
    #[serde(rename = "fuelCost")]
    pub current: f64,
}

/// Full `fuelinfo` reply.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FuelInfo {
    /// Active connections to the owner's structures.
    pub connections: Vec<FuelConnection>,
    /// Strategies and their reserves.
    pub strategies: Vec<FuelStrategy>,
    /// Cost per API route.
    pub apis: BTreeMap<String, ApiCost>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fuel_info_from_wire() {
        let info: FuelInfo = serde_json::from_value(json!({
            "connections": [{
                "x": 10, "y": 64, "z": -3,
                "structure": "Structure(chest)",
                "fuelUsage": {"get_block": {"second": 0.5, "minute": 12}}
            }],
            "strategies": [{"strategy": "ratelimit", "spareFuel": 4.5}],
            "apis": {"get_block": {"baseFuelCost": 0.1, "fuelCost": 0.25}}
        }))
        .unwrap();

        assert_eq!(info.connections[0].location, Location::new(10, 64, -3));
        assert_eq!(info.connections[0].usage["get_block"].minute, 12.0);
        assert_eq!(info.strategies[0].strategy, "ratelimit");
        assert_eq!(info.apis["get_block"].current, 0.25);
    }
}
