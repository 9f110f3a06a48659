//! # craft-core
//!
//! Shared vocabulary for the craft structure client:
//!
//! - **Actions**: [`ActionType`] and the flat [`ActionData`] payload map
//! - **Errors**: [`CraftError`] via `thiserror`
//! - **Blocks**: [`Identifier`], [`Block`], [`BlockUpdateCause`]
//! - **World**: [`Location`], [`WorldLocation`], [`Player`], [`Entity`]
//! - **Inventory**: [`Item`], [`ItemSlot`]
//! - **Fuel**: [`FuelInfo`] and its parts
//! - **Tokens**: [`Token`] parsing
//! - **Logging**: `tracing` subscriber setup and test capture

#![deny(unsafe_code)]

pub mod action;
pub mod block;
pub mod errors;
pub mod fuel;
pub mod inventory;
pub mod logging;
pub mod token;
pub mod world;

pub use action::{ActionData, ActionType, decode_reply};
pub use block::{Block, BlockUpdateCause, Identifier};
pub use errors::{CraftError, Result};
pub use fuel::{ApiCost, FuelConnection, FuelInfo, FuelStrategy, FuelUsage};
pub use inventory::{InventoryData, Item, ItemDurability, ItemSlot};
pub use token::{Token, TokenPermission};
pub use world::{Entity, Location, Player, Position, WorldLocation};
