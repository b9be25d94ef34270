//! Turning a meal plan into a list of things to buy.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::ShoppingListItem;
use crate::common::normalize_unit;
use crate::meal_plans::MealPlanEntry;
use crate::pantry::sufficiency::{self, Holding, Requirement, UnitConversion};
use crate::recipes::{Recipe, RecipeIngredient};

/// One line to buy: the part of an aggregated requirement the pantry does not cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingLine {
    pub item_id: Uuid,
    pub unit: Option<String>,
    pub quantity: f64,
}

/// Ingredient requirements of every entry, scaled to the entry's servings.
///
/// A recipe written for 4 scheduled for 2 needs half of each ingredient.
/// Entries whose recipe is missing from `recipes` contribute nothing.
pub fn requirements(
    entries: &[MealPlanEntry],
    recipes: &[Recipe],
    ingredients: &[RecipeIngredient],
) -> Vec<Requirement> {
    let servings_of: HashMap<Uuid, i32> = recipes.iter().map(|r| (r.id, r.servings)).collect();
    let mut by_recipe: HashMap<Uuid, Vec<&RecipeIngredient>> = HashMap::new();
    for ing in ingredients {
        by_recipe.entry(ing.recipe_id).or_default().push(ing);
    }

    let mut out = Vec::new();
    for entry in entries {
        let Some(&base) = servings_of.get(&entry.recipe_id) else {
            continue;
        };
        let factor = f64::from(entry.servings) / f64::from(base.max(1));
        for ing in by_recipe.get(&entry.recipe_id).into_iter().flatten() {
            out.push(Requirement {
                item_id: ing.item_id,
                quantity: ing.quantity * factor,
                unit: ing.unit.clone(),
                is_optional: ing.is_optional,
            });
        }
    }
    out
}

/// Lines to buy for a set of plan entries given what the pantry holds.
///
/// Same item in the same unit across recipes becomes one line with the
/// summed quantity. Output is ordered by item id then unit, so the result is
/// a pure function of its inputs.
pub fn shortfalls(
    entries: &[MealPlanEntry],
    recipes: &[Recipe],
    ingredients: &[RecipeIngredient],
    holdings: &[Holding],
    now: OffsetDateTime,
    units: &dyn UnitConversion,
) -> Vec<ShoppingLine> {
    let reqs = requirements(entries, recipes, ingredients);
    sufficiency::evaluate(&reqs, holdings, now, units)
        .missing()
        .map(|check| ShoppingLine {
            item_id: check.item_id,
            unit: check.unit.clone(),
            quantity: check.shortfall(),
        })
        .collect()
}

/// Drop from `lines` what was already bought on the list being regenerated.
///
/// Purchased rows count against lines with the same item and unit. Lines
/// left with nothing to buy are removed.
pub fn net_of_purchased(lines: Vec<ShoppingLine>, kept: &[ShoppingListItem]) -> Vec<ShoppingLine> {
    let mut bought: HashMap<(Uuid, Option<String>), f64> = HashMap::new();
    for item in kept.iter().filter(|i| i.is_purchased) {
        *bought
            .entry((item.item_id, normalize_unit(item.unit.as_deref())))
            .or_default() += item.quantity;
    }
    lines
        .into_iter()
        .filter_map(|mut line| {
            let key = (line.item_id, normalize_unit(line.unit.as_deref()));
            if let Some(&done) = bought.get(&key) {
                line.quantity -= done;
            }
            (line.quantity > 1e-9).then_some(line)
        })
        .collect()
}

#[cfg(test)]
mod generate_tests {
    use super::*;
    use crate::common::{Audit, DietaryTags};
    use crate::pantry::sufficiency::SameUnit;
    use crate::recipes::{MealType, RecipeSource};
    use time::macros::{date, datetime};

    const NOW: OffsetDateTime = datetime!(2024-01-01 09:00 UTC);

    fn audit() -> Audit {
        Audit {
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn recipe(servings: i32) -> Recipe {
        Recipe {
            id: Uuid::new_v4(),
            title: "Omelette".into(),
            description: None,
            instructions: "Whisk and fry".into(),
            cuisine_type: None,
            meal_type: Some(MealType::Breakfast),
            prep_time: None,
            cook_time: None,
            servings,
            estimated_cost: None,
            dietary_tags: DietaryTags::default(),
            source: RecipeSource::Database,
            image_url: None,
            ai_request_log_id: None,
            audit: audit(),
        }
    }

    fn ingredient(recipe: &Recipe, item: Uuid, qty: f64, optional: bool) -> RecipeIngredient {
        RecipeIngredient {
            id: Uuid::new_v4(),
            recipe_id: recipe.id,
            item_id: item,
            quantity: qty,
            unit: None,
            is_optional: optional,
            notes: None,
            audit: audit(),
        }
    }

    fn entry(recipe: &Recipe, servings: i32, meal: MealType) -> MealPlanEntry {
        MealPlanEntry {
            id: Uuid::new_v4(),
            meal_plan_id: Uuid::nil(),
            recipe_id: recipe.id,
            scheduled_date: date!(2024 - 01 - 02),
            meal_type: meal,
            servings,
            notes: None,
            audit: audit(),
        }
    }

    fn holding(item: Uuid, qty: f64) -> Holding {
        Holding {
            item_id: item,
            quantity: qty,
            unit: None,
            expiry_date: None,
        }
    }

    #[test]
    fn pantry_stock_is_subtracted() {
        let x = Uuid::new_v4();
        let r = recipe(1);
        let lines = shortfalls(
            &[entry(&r, 1, MealType::Dinner)],
            &[r.clone()],
            &[ingredient(&r, x, 3.0, false)],
            &[holding(x, 1.0)],
            NOW,
            &SameUnit,
        );
        assert_eq!(
            lines,
            vec![ShoppingLine {
                item_id: x,
                unit: None,
                quantity: 2.0
            }]
        );
    }

    #[test]
    fn empty_pantry_buys_everything_required() {
        let eggs = Uuid::new_v4();
        let salt = Uuid::new_v4();
        let r = recipe(1);
        let lines = shortfalls(
            &[entry(&r, 1, MealType::Dinner)],
            &[r.clone()],
            &[ingredient(&r, eggs, 2.0, false), ingredient(&r, salt, 1.0, true)],
            &[],
            NOW,
            &SameUnit,
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_id, eggs);
        assert_eq!(lines[0].quantity, 2.0);
    }

    #[test]
    fn duplicate_items_across_recipes_are_merged() {
        let eggs = Uuid::new_v4();
        let a = recipe(1);
        let b = recipe(2);
        let lines = shortfalls(
            &[entry(&a, 1, MealType::Breakfast), entry(&b, 4, MealType::Dinner)],
            &[a.clone(), b.clone()],
            &[ingredient(&a, eggs, 2.0, false), ingredient(&b, eggs, 3.0, false)],
            &[],
            NOW,
            &SameUnit,
        );
        // 2 for a, plus 3 scaled from 2 servings to 4.
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 8.0);
    }

    #[test]
    fn covered_items_produce_no_lines() {
        let flour = Uuid::new_v4();
        let r = recipe(1);
        let lines = shortfalls(
            &[entry(&r, 1, MealType::Lunch)],
            &[r.clone()],
            &[ingredient(&r, flour, 2.0, false)],
            &[holding(flour, 5.0)],
            NOW,
            &SameUnit,
        );
        assert!(lines.is_empty());
    }

    #[test]
    fn rerunning_yields_the_same_lines() {
        let a_item = Uuid::new_v4();
        let b_item = Uuid::new_v4();
        let r = recipe(1);
        let entries = [entry(&r, 2, MealType::Dinner)];
        let ings = [ingredient(&r, b_item, 1.0, false), ingredient(&r, a_item, 1.5, false)];
        let first = shortfalls(&entries, &[r.clone()], &ings, &[], NOW, &SameUnit);
        let second = shortfalls(&entries, &[r.clone()], &ings, &[], NOW, &SameUnit);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    fn bought(item: Uuid, qty: f64, unit: Option<&str>, purchased: bool) -> ShoppingListItem {
        ShoppingListItem {
            id: Uuid::new_v4(),
            shopping_list_id: Uuid::nil(),
            item_id: item,
            quantity: qty,
            unit: unit.map(str::to_string),
            is_purchased: purchased,
            estimated_price: None,
            notes: None,
            audit: audit(),
        }
    }

    #[test]
    fn purchased_rows_reduce_regenerated_lines() {
        let eggs = Uuid::new_v4();
        let milk = Uuid::new_v4();
        let lines = vec![
            ShoppingLine {
                item_id: eggs,
                unit: Some("pcs".into()),
                quantity: 6.0,
            },
            ShoppingLine {
                item_id: milk,
                unit: Some("l".into()),
                quantity: 1.0,
            },
        ];
        let kept = [
            bought(eggs, 4.0, Some("PCS"), true),
            bought(milk, 1.0, Some("l"), true),
            bought(milk, 5.0, Some("ml"), true),
        ];
        assert_eq!(
            net_of_purchased(lines, &kept),
            vec![ShoppingLine {
                item_id: eggs,
                unit: Some("pcs".into()),
                quantity: 2.0
            }]
        );
    }

    #[test]
    fn unpurchased_rows_do_not_count() {
        let rice = Uuid::new_v4();
        let lines = vec![ShoppingLine {
            item_id: rice,
            unit: None,
            quantity: 300.0,
        }];
        let out = net_of_purchased(lines.clone(), &[bought(rice, 300.0, None, false)]);
        assert_eq!(out, lines);
    }

    #[test]
    fn half_servings_scale_down() {
        let rice = Uuid::new_v4();
        let r = recipe(4);
        let reqs = requirements(&[entry(&r, 2, MealType::Lunch)], &[r.clone()], &[ingredient(&r, rice, 400.0, false)]);
        assert_eq!(reqs[0].quantity, 200.0);
    }
}
