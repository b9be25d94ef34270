use serde::{Deserialize, Deserializer, Serialize};

use super::normalize_text;

/// Ordered, de-duplicated set of lowercase tags (dietary preferences, recipe labels).
///
/// Stored as `TEXT[]`. Insertion order of the first occurrence is kept so the
/// client sees tags in the order they were chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(transparent, no_pg_array)]
pub struct DietaryTags(Vec<String>);

impl DietaryTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for tag in tags {
            let tag = normalize_text(tag.as_ref());
            if !tag.is_empty() && !out.contains(&tag) {
                out.push(tag);
            }
        }
        Self(out)
    }

    pub fn contains(&self, tag: &str) -> bool {
        let tag = normalize_text(tag);
        self.0.iter().any(|t| *t == tag)
    }

    /// True when every tag in `required` is present.
    pub fn satisfies(&self, required: &DietaryTags) -> bool {
        required.0.iter().all(|t| self.0.contains(t))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for DietaryTags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

#[cfg(test)]
mod tags_tests {
    use super::*;

    #[test]
    fn normalizes_and_deduplicates_keeping_first_order() {
        let tags = DietaryTags::new(["Vegan", " gluten  free ", "vegan", "", "GLUTEN FREE", "keto"]);
        assert_eq!(tags.as_slice(), ["vegan", "gluten free", "keto"]);
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn contains_uses_normalized_form() {
        let tags = DietaryTags::new(["Dairy Free"]);
        assert!(tags.contains("  dairy   FREE"));
        assert!(!tags.contains("vegan"));
    }

    #[test]
    fn satisfies_requires_all_tags() {
        let recipe = DietaryTags::new(["vegan", "nut free"]);
        assert!(recipe.satisfies(&DietaryTags::new(["Vegan"])));
        assert!(recipe.satisfies(&DietaryTags::default()));
        assert!(!recipe.satisfies(&DietaryTags::new(["vegan", "keto"])));
    }

    #[test]
    fn deserializing_normalizes() {
        let tags: DietaryTags = serde_json::from_str(r#"["Halal", "halal", " Low Carb"]"#).unwrap();
        assert_eq!(tags.as_slice(), ["halal", "low carb"]);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["halal","low carb"]"#);
    }
}
