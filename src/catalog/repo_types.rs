use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::Audit;
use crate::error::{DataError, DataResult};

/// What a catalog entry is: something you eat or something you cook with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inventory_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InventoryType {
    Ingredient,
    Utensil,
}

impl fmt::Display for InventoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingredient => f.write_str("ingredient"),
            Self::Utensil => f.write_str("utensil"),
        }
    }
}

/// Grouping of catalog items, e.g. Dairy, Spices, Cookware.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryCategory {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: InventoryType,
    pub description: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

/// Master list entry shared by every user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub category_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: InventoryType,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InventoryType,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCatalogItem {
    pub name: String,
    pub category_id: Uuid,
    #[serde(rename = "type")]
    pub kind: InventoryType,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

pub(crate) fn validate_name(entity: &'static str, name: &str, max: usize) -> DataResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DataError::validation(entity, "name", "must not be empty"));
    }
    if name.chars().count() > max {
        return Err(DataError::validation(
            entity,
            "name",
            format!("longer than {max} characters"),
        ));
    }
    Ok(name.to_string())
}

/// An item may only live in a category of its own kind.
pub fn ensure_kind_matches(item: InventoryType, category: &InventoryCategory) -> DataResult<()> {
    if item != category.kind {
        return Err(DataError::inconsistent(
            "catalog_item",
            format!(
                "item of type {item} cannot belong to {} category `{}`",
                category.kind, category.name
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod catalog_type_tests {
    use super::*;
    use time::OffsetDateTime;

    fn category(kind: InventoryType) -> InventoryCategory {
        let now = OffsetDateTime::now_utc();
        InventoryCategory {
            id: Uuid::new_v4(),
            name: "Cookware".into(),
            kind,
            description: None,
            audit: Audit {
                created_at: now,
                updated_at: now,
            },
        }
    }

    #[test]
    fn matching_kind_is_accepted() {
        assert!(ensure_kind_matches(InventoryType::Utensil, &category(InventoryType::Utensil)).is_ok());
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let err = ensure_kind_matches(InventoryType::Ingredient, &category(InventoryType::Utensil))
            .unwrap_err();
        assert!(matches!(err, DataError::ReferentialInconsistency { entity: "catalog_item", .. }));
        assert!(err.to_string().contains("Cookware"));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("category", "  Dairy ", 100).unwrap(), "Dairy");
        assert!(validate_name("category", "   ", 100).is_err());
        assert!(validate_name("category", &"x".repeat(101), 100).is_err());
    }

    #[test]
    fn inventory_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&InventoryType::Utensil).unwrap(), r#""utensil""#);
    }
}
