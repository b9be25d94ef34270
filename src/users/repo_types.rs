use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::{Audit, DietaryTags};
use crate::error::{DataError, DataResult};

/// User record. Identified by the installation's device id, no credentials.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub device_id: String,
    pub name: Option<String>,
    pub household_size: i32,
    pub monthly_budget: Option<i32>,
    pub currency: String,
    pub dietary_preferences: DietaryTags,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

/// Profile fields a user may change. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub household_size: Option<i32>,
    pub monthly_budget: Option<i32>,
    pub currency: Option<String>,
    pub dietary_preferences: Option<DietaryTags>,
}

/// Rows removed by a user cascade, per owned table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub shopping_list_items: u64,
    pub shopping_lists: u64,
    pub meal_plan_entries: u64,
    pub meal_plans: u64,
    pub pantry_items: u64,
    pub recipe_history: u64,
    pub ai_request_logs: u64,
}

impl CascadeReport {
    pub fn total(&self) -> u64 {
        self.shopping_list_items
            + self.shopping_lists
            + self.meal_plan_entries
            + self.meal_plans
            + self.pantry_items
            + self.recipe_history
            + self.ai_request_logs
    }
}

pub(crate) fn is_valid_currency(code: &str) -> bool {
    lazy_static! {
        static ref CURRENCY_RE: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();
    }
    CURRENCY_RE.is_match(code)
}

pub(crate) fn validate_device_id(device_id: &str) -> DataResult<String> {
    let device_id = device_id.trim();
    if device_id.is_empty() || device_id.len() > 36 {
        return Err(DataError::validation(
            "user",
            "device_id",
            "must be 1 to 36 characters",
        ));
    }
    Ok(device_id.to_string())
}

/// Optional display name at registration: trimmed, blank becomes `None`.
pub(crate) fn validate_name(name: Option<&str>) -> DataResult<Option<String>> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > 100 {
        return Err(DataError::validation("user", "name", "longer than 100 characters"));
    }
    Ok(Some(name.to_string()))
}

impl ProfileUpdate {
    /// Checks and normalizes every provided field.
    pub fn validated(mut self) -> DataResult<Self> {
        if let Some(name) = self.name.take() {
            let name = name.trim().to_string();
            if name.chars().count() > 100 {
                return Err(DataError::validation("user", "name", "longer than 100 characters"));
            }
            self.name = Some(name);
        }
        if let Some(size) = self.household_size {
            if size < 1 {
                return Err(DataError::validation("user", "household_size", "must be at least 1"));
            }
        }
        if let Some(budget) = self.monthly_budget {
            if budget < 0 {
                return Err(DataError::validation("user", "monthly_budget", "must not be negative"));
            }
        }
        if let Some(currency) = self.currency.take() {
            let currency = currency.trim().to_uppercase();
            if !is_valid_currency(&currency) {
                return Err(DataError::validation(
                    "user",
                    "currency",
                    "must be a three-letter ISO 4217 code",
                ));
            }
            self.currency = Some(currency);
        }
        Ok(self)
    }
}
