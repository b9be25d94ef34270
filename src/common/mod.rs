mod audit;
mod tags;

pub use audit::Audit;
pub use tags::DietaryTags;

use lazy_static::lazy_static;
use regex::Regex;

/// Trim, lowercase and collapse inner whitespace to single spaces.
pub fn normalize_text(raw: &str) -> String {
    lazy_static! {
        static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
    }
    WS_RE.replace_all(raw.trim(), " ").to_lowercase()
}

/// Normalized unit spelling; blank units collapse to `None`.
pub fn normalize_unit(unit: Option<&str>) -> Option<String> {
    unit.map(normalize_text).filter(|u| !u.is_empty())
}
