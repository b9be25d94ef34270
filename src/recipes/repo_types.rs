use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::{normalize_unit, Audit, DietaryTags};
use crate::error::{DataError, DataResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recipe_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipeSource {
    AiGenerated,
    #[default]
    Database,
    UserSubmitted,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub cuisine_type: Option<String>,
    pub meal_type: Option<MealType>,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    pub servings: i32,
    pub estimated_cost: Option<f64>,
    pub dietary_tags: DietaryTags,
    pub source: RecipeSource,
    pub image_url: Option<String>,
    pub ai_request_log_id: Option<Uuid>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

impl Recipe {
    pub fn total_time(&self) -> Option<i32> {
        match (self.prep_time, self.cook_time) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0).saturating_add(c.unwrap_or(0))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeIngredient {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub is_optional: bool,
    pub notes: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeUtensil {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub item_id: Uuid,
    pub is_optional: bool,
    pub notes: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeWithComposition {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredient>,
    pub utensils: Vec<RecipeUtensil>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUtensil {
    pub item_id: Uuid,
    #[serde(default)]
    pub is_optional: bool,
    pub notes: Option<String>,
}

/// Ingredient and utensil lines of a recipe, written together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Composition {
    #[serde(default)]
    pub ingredients: Vec<NewIngredient>,
    #[serde(default)]
    pub utensils: Vec<NewUtensil>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipe {
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub cuisine_type: Option<String>,
    pub meal_type: Option<MealType>,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    #[serde(default = "default_servings")]
    pub servings: i32,
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub dietary_tags: DietaryTags,
    #[serde(default)]
    pub source: RecipeSource,
    pub image_url: Option<String>,
    pub ai_request_log_id: Option<Uuid>,
    #[serde(flatten)]
    pub composition: Composition,
}

fn default_servings() -> i32 {
    1
}

/// Metadata edits. Composition is changed through `replace_composition` only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeDetailsUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub cuisine_type: Option<String>,
    pub meal_type: Option<MealType>,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    pub servings: Option<i32>,
    pub estimated_cost: Option<f64>,
    pub dietary_tags: Option<DietaryTags>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeFilter {
    pub meal_type: Option<MealType>,
    pub source: Option<RecipeSource>,
    pub dietary_tag: Option<String>,
    pub title_contains: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

const ENTITY: &str = "recipe";

fn check_title(title: &str) -> DataResult<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(DataError::validation(ENTITY, "title", "must be 1 to 200 characters"));
    }
    Ok(title.to_string())
}

fn check_servings(servings: i32) -> DataResult<()> {
    if servings < 1 {
        return Err(DataError::validation(ENTITY, "servings", "must be at least 1"));
    }
    Ok(())
}

/// One week, matching the `recipes` table check.
pub const MAX_MINUTES: i32 = 10_080;

fn check_minutes(field: &'static str, value: Option<i32>) -> DataResult<()> {
    if value.is_some_and(|m| !(0..=MAX_MINUTES).contains(&m)) {
        return Err(DataError::validation(ENTITY, field, "must be 0 to 10080 minutes"));
    }
    Ok(())
}

fn check_cost(value: Option<f64>) -> DataResult<()> {
    if value.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(DataError::validation(ENTITY, "estimated_cost", "must be a finite number >= 0"));
    }
    Ok(())
}

impl Composition {
    pub fn validated(mut self) -> DataResult<Self> {
        for ing in &mut self.ingredients {
            if !ing.quantity.is_finite() || ing.quantity < 0.0 {
                return Err(DataError::validation(
                    "recipe_ingredient",
                    "quantity",
                    "must be a finite number >= 0",
                ));
            }
            if !ing.is_optional && ing.quantity <= 0.0 {
                return Err(DataError::validation(
                    "recipe_ingredient",
                    "quantity",
                    "required ingredients need a quantity > 0",
                ));
            }
            ing.unit = normalize_unit(ing.unit.as_deref());
        }
        Ok(self)
    }

    pub fn ingredient_ids(&self) -> Vec<Uuid> {
        self.ingredients.iter().map(|i| i.item_id).collect()
    }

    pub fn utensil_ids(&self) -> Vec<Uuid> {
        self.utensils.iter().map(|u| u.item_id).collect()
    }
}

impl NewRecipe {
    pub fn validated(mut self) -> DataResult<Self> {
        self.title = check_title(&self.title)?;
        if self.instructions.trim().is_empty() {
            return Err(DataError::validation(ENTITY, "instructions", "must not be empty"));
        }
        check_servings(self.servings)?;
        check_minutes("prep_time", self.prep_time)?;
        check_minutes("cook_time", self.cook_time)?;
        check_cost(self.estimated_cost)?;
        match (self.source, self.ai_request_log_id) {
            (RecipeSource::AiGenerated, None) => {
                return Err(DataError::validation(
                    ENTITY,
                    "ai_request_log_id",
                    "AI generated recipes must reference the request that produced them",
                ))
            }
            (RecipeSource::Database | RecipeSource::UserSubmitted, Some(_)) => {
                return Err(DataError::validation(
                    ENTITY,
                    "ai_request_log_id",
                    "only AI generated recipes reference an AI request",
                ))
            }
            _ => {}
        }
        self.composition = self.composition.validated()?;
        Ok(self)
    }
}

impl RecipeDetailsUpdate {
    pub fn validated(mut self) -> DataResult<Self> {
        if let Some(title) = self.title.take() {
            self.title = Some(check_title(&title)?);
        }
        if self.instructions.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(DataError::validation(ENTITY, "instructions", "must not be empty"));
        }
        if let Some(servings) = self.servings {
            check_servings(servings)?;
        }
        check_minutes("prep_time", self.prep_time)?;
        check_minutes("cook_time", self.cook_time)?;
        check_cost(self.estimated_cost)?;
        Ok(self)
    }
}
