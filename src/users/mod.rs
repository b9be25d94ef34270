//! Root aggregate: a user owns its pantry, history, plans, lists and AI logs.

pub mod repo;
pub mod repo_types;

pub use repo_types::{CascadeReport, ProfileUpdate, User};
