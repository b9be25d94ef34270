use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::Date;
use uuid::Uuid;

use crate::common::Audit;
use crate::error::{DataError, DataResult};
use crate::recipes::MealType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_plan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl MealPlanStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Active => 1,
            Self::Archived => 2,
        }
    }

    /// Normal lifecycle only moves forward: draft → active → archived (draft may archive directly).
    pub fn can_transition_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for MealPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub start_date: Date,
    pub end_date: Date,
    pub persons_count: i32,
    pub budget: Option<f64>,
    pub status: MealPlanStatus,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

impl MealPlan {
    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).whole_days() + 1
    }

    pub fn ensure_contains(&self, date: Date) -> DataResult<()> {
        if !self.contains(date) {
            return Err(DataError::inconsistent(
                "meal_plan_entry",
                format!(
                    "scheduled date {date} is outside plan range {}..={}",
                    self.start_date, self.end_date
                ),
            ));
        }
        Ok(())
    }

    pub fn ensure_editable(&self) -> DataResult<()> {
        if self.status == MealPlanStatus::Archived {
            return Err(DataError::inconsistent(
                "meal_plan",
                format!("plan {} is archived", self.id),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanEntry {
    pub id: Uuid,
    pub meal_plan_id: Uuid,
    pub recipe_id: Uuid,
    pub scheduled_date: Date,
    pub meal_type: MealType,
    pub servings: i32,
    pub notes: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMealPlan {
    pub title: String,
    pub start_date: Date,
    pub end_date: Date,
    #[serde(default = "one")]
    pub persons_count: i32,
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    pub recipe_id: Uuid,
    pub scheduled_date: Date,
    pub meal_type: MealType,
    #[serde(default = "one")]
    pub servings: i32,
    pub notes: Option<String>,
}

fn one() -> i32 {
    1
}

pub fn validate_range(start: Date, end: Date) -> DataResult<()> {
    if start > end {
        return Err(DataError::validation(
            "meal_plan",
            "end_date",
            format!("{end} is before start_date {start}"),
        ));
    }
    Ok(())
}

impl NewMealPlan {
    pub fn validated(mut self) -> DataResult<Self> {
        let title = self.title.trim();
        if title.is_empty() || title.chars().count() > 200 {
            return Err(DataError::validation("meal_plan", "title", "must be 1 to 200 characters"));
        }
        self.title = title.to_string();
        validate_range(self.start_date, self.end_date)?;
        if self.persons_count < 1 {
            return Err(DataError::validation("meal_plan", "persons_count", "must be at least 1"));
        }
        if self.budget.is_some_and(|b| !b.is_finite() || b < 0.0) {
            return Err(DataError::validation("meal_plan", "budget", "must be a finite number >= 0"));
        }
        Ok(self)
    }
}

impl NewEntry {
    pub fn validate(&self) -> DataResult<()> {
        if self.servings < 1 {
            return Err(DataError::validation("meal_plan_entry", "servings", "must be at least 1"));
        }
        if self.notes.as_deref().is_some_and(|n| n.chars().count() > 500) {
            return Err(DataError::validation("meal_plan_entry", "notes", "longer than 500 characters"));
        }
        Ok(())
    }
}

/// Reject a second dish in an occupied (date, meal type) slot unless allowed.
pub fn ensure_slot_free(
    existing: &[MealPlanEntry],
    date: Date,
    meal_type: MealType,
    allow_multiple: bool,
) -> DataResult<()> {
    if allow_multiple {
        return Ok(());
    }
    if existing
        .iter()
        .any(|e| e.scheduled_date == date && e.meal_type == meal_type)
    {
        return Err(DataError::inconsistent(
            "meal_plan_entry",
            format!("{meal_type} on {date} is already planned"),
        ));
    }
    Ok(())
}

/// Entries that would fall outside a proposed new range.
pub fn entries_outside(entries: &[MealPlanEntry], start: Date, end: Date) -> Vec<&MealPlanEntry> {
    entries
        .iter()
        .filter(|e| e.scheduled_date < start || e.scheduled_date > end)
        .collect()
}
