//! Shopping lists: generated from meal plans or put together by hand.

pub mod generate;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use generate::ShoppingLine;
pub use repo_types::{
    Estimate, NewShoppingItem, ShoppingList, ShoppingListItem, ShoppingListStatus,
    ShoppingListWithItems,
};
