//! Per-user pantry holdings and the ingredient sufficiency check.

pub mod repo;
pub mod repo_types;
pub mod services;
pub mod sufficiency;

pub use repo_types::{NewPantryItem, PantryItem};
pub use sufficiency::{SameUnit, SufficiencyReport, UnitConversion};
