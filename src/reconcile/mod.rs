//! Post-barrier reconciliation of inventories and station metadata.

pub mod inventory;
pub mod metadata;

pub use self::inventory::{Inventory, InventoryConflict, InventoryKey, InventoryStore, merge};
pub use self::metadata::{StationListStore, reconcile_stations};
