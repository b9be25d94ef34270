//! Cache keys for AI requests.
//!
//! Two requests that differ only in ingredient order, letter case or
//! whitespace must hash the same, otherwise the cache never hits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::common::normalize_text;

/// What the client asks the AI for, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptRequest {
    pub request_type: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
}

/// Normalized request. Serialized compactly it is the canonical prompt form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPrompt {
    pub request_type: String,
    pub ingredients: Vec<String>,
    pub constraints: BTreeMap<String, String>,
}

impl PromptRequest {
    pub fn normalize(&self) -> NormalizedPrompt {
        let mut ingredients: Vec<String> = self
            .ingredients
            .iter()
            .map(|i| normalize_text(i))
            .filter(|i| !i.is_empty())
            .collect();
        ingredients.sort();
        ingredients.dedup();

        let constraints = self
            .constraints
            .iter()
            .map(|(k, v)| (normalize_text(k), normalize_text(v)))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();

        NormalizedPrompt {
            request_type: normalize_text(&self.request_type),
            ingredients,
            constraints,
        }
    }
}

impl NormalizedPrompt {
    /// Compact JSON with sorted keys; stable across runs and platforms.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Lowercase hex SHA-256 of the canonical form, 64 characters.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        format!("{:x}", digest)
    }
}

#[cfg(test)]
mod prompt_tests {
    use super::*;

    fn request(ingredients: &[&str], constraints: &[(&str, &str)]) -> PromptRequest {
        PromptRequest {
            request_type: "recipe_generation".into(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            constraints: constraints
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn order_case_and_whitespace_do_not_change_the_hash() {
        let a = request(&["Eggs", "tomato", "  feta cheese"], &[("Diet", "Vegetarian")]);
        let b = request(&["FETA  cheese", "eggs", "Tomato", "eggs"], &[("diet", " vegetarian ")]);
        assert_eq!(a.normalize(), b.normalize());
        assert_eq!(a.normalize().hash(), b.normalize().hash());
    }

    #[test]
    fn different_ingredients_change_the_hash() {
        let a = request(&["eggs"], &[]);
        let b = request(&["eggs", "milk"], &[]);
        assert_ne!(a.normalize().hash(), b.normalize().hash());
    }

    #[test]
    fn empty_constraint_values_are_dropped() {
        let a = request(&["rice"], &[("cuisine", "  ")]);
        let b = request(&["rice"], &[]);
        assert_eq!(a.normalize().hash(), b.normalize().hash());
    }

    #[test]
    fn hash_is_64_lowercase_hex_chars() {
        let h = request(&["rice"], &[]).normalize().hash();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn canonical_form_is_compact_sorted_json() {
        let n = request(&["b", "a"], &[("z", "1"), ("a", "2")]).normalize();
        assert_eq!(
            n.canonical(),
            r#"{"request_type":"recipe_generation","ingredients":["a","b"],"constraints":{"a":"2","z":"1"}}"#
        );
    }
}
