use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::sufficiency::Holding;
use crate::common::{normalize_unit, Audit};
use crate::error::{DataError, DataResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PantryItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub added_at: OffsetDateTime,
    pub expiry_date: Option<OffsetDateTime>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

impl From<&PantryItem> for Holding {
    fn from(p: &PantryItem) -> Self {
        Self {
            item_id: p.item_id,
            quantity: p.quantity,
            unit: p.unit.clone(),
            expiry_date: p.expiry_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPantryItem {
    pub item_id: Uuid,
    #[serde(default)]
    pub quantity: f64,
    pub unit: Option<String>,
    pub expiry_date: Option<OffsetDateTime>,
}

impl NewPantryItem {
    pub(crate) fn validated(mut self) -> DataResult<Self> {
        validate_quantity(self.quantity)?;
        self.unit = normalize_unit(self.unit.as_deref());
        Ok(self)
    }
}

pub(crate) fn validate_quantity(quantity: f64) -> DataResult<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(DataError::validation(
            "pantry_item",
            "quantity",
            "must be a finite number >= 0",
        ));
    }
    Ok(())
}
