//! Shared reference data: inventory categories and the master item list.

pub mod repo;
pub mod repo_types;

pub use repo_types::{CatalogItem, InventoryCategory, InventoryType, NewCatalogItem, NewCategory};
