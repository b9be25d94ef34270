use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common::{normalize_unit, Audit};
use crate::error::{DataError, DataResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "shopping_list_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShoppingListStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl ShoppingListStatus {
    /// Status implied by how many of `total` items are purchased.
    pub fn from_progress(purchased: usize, total: usize) -> Self {
        if total == 0 || purchased == 0 {
            Self::Pending
        } else if purchased >= total {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

impl fmt::Display for ShoppingListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShoppingList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub meal_plan_id: Option<Uuid>,
    pub title: Option<String>,
    pub generated_at: OffsetDateTime,
    pub status: ShoppingListStatus,
    pub estimated_total: Option<f64>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShoppingListItem {
    pub id: Uuid,
    pub shopping_list_id: Uuid,
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub is_purchased: bool,
    /// Price per unit of `unit`.
    pub estimated_price: Option<f64>,
    pub notes: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

/// Cost estimate of a list. Unpriced lines are counted, never treated as free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Estimate {
    pub total: f64,
    pub priced_items: usize,
    pub unpriced_items: usize,
}

impl Estimate {
    pub fn of(items: &[ShoppingListItem]) -> Self {
        items.iter().fold(Self::default(), |mut acc, item| {
            match item.estimated_price {
                Some(price) => {
                    acc.total += price * item.quantity;
                    acc.priced_items += 1;
                }
                None => acc.unpriced_items += 1,
            }
            acc
        })
    }

    pub fn is_complete(&self) -> bool {
        self.unpriced_items == 0
    }

    /// Value stored in `shopping_lists.estimated_total`: unknown until something is priced.
    pub fn stored_total(&self) -> Option<f64> {
        (self.priced_items > 0).then_some(self.total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingListWithItems {
    #[serde(flatten)]
    pub list: ShoppingList,
    pub items: Vec<ShoppingListItem>,
    pub estimate: Estimate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShoppingItem {
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub estimated_price: Option<f64>,
    pub notes: Option<String>,
}

pub(crate) fn validate_price(price: Option<f64>) -> DataResult<()> {
    if price.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(DataError::validation(
            "shopping_list_item",
            "estimated_price",
            "must be a finite number >= 0",
        ));
    }
    Ok(())
}

impl NewShoppingItem {
    pub fn validated(mut self) -> DataResult<Self> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(DataError::validation(
                "shopping_list_item",
                "quantity",
                "must be greater than 0",
            ));
        }
        validate_price(self.estimated_price)?;
        self.unit = normalize_unit(self.unit.as_deref());
        Ok(self)
    }
}
