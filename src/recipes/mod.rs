//! Recipes and their ingredient/utensil composition.

pub mod repo;
pub mod repo_types;

pub use repo_types::{
    Composition, MealType, NewIngredient, NewRecipe, NewUtensil, Recipe, RecipeDetailsUpdate,
    RecipeFilter, RecipeIngredient, RecipeSource, RecipeUtensil, RecipeWithComposition,
};
