//! Items and container slots.

use serde::Deserialize;

use crate::block::Identifier;
use crate::world::Location;

/// Current and maximum durability of a damageable item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemDurability {
    /// Maximum durability.
    pub max: u32,
    /// Remaining durability.
    pub current: u32,
}

/// An item stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Item identifier.
    pub identifier: Identifier,
    /// Durability, for items that have one.
    pub durability: Option<ItemDurability>,
    /// Stack size.
    pub amount: u32,
}

/// A slot inside a container at a known location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSlot {
    /// Location of the container.
    pub location: Location,
    /// Slot index inside the container.
    pub index: u32,
    /// The stack in this slot.
    pub item: Item,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotData {
    index: u32,
    #[serde(rename = "type")]
    kind: String,
    amount: u32,
    #[serde(default)]
    max_durability: Option<u32>,
    #[serde(default)]
    durability: Option<u32>,
}

/// Slot list of a `get_inventory` reply.
#[derive(Debug, Deserialize)]
pub struct InventoryData {
    items: Vec<SlotData>,
}

impl InventoryData {
    /// Attach the container location to each slot.
    ///
    /// Slots whose item type is not a valid identifier are dropped.
    pub fn into_slots(self, location: Location) -> Vec<ItemSlot> {
        self.items
            .into_iter()
            .filter_map(|slot| {
                let identifier = slot.kind.parse().ok()?;
                let durability = match (slot.max_durability, slot.durability) {
                    (Some(max), Some(current)) if max > 0 => {
                        Some(ItemDurability { max, current })
                    }
                    _ => None,
                };
                Some(ItemSlot {
                    location,
                    index: slot.index,
                    item: Item {
                        identifier,
                        durability,
                        amount: slot.amount,
                    },
                })
            })
            .collect()
    }
}
