//! Does the pantry cover a set of ingredient requirements?

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common::normalize_unit;

/// Quantities below this are treated as zero.
pub const EPSILON: f64 = 1e-9;

/// Converts quantities between units. Implemented by whatever unit service the caller has.
pub trait UnitConversion: Send + Sync {
    /// `quantity` expressed in `from`, converted to `to`. `None` when the units are incompatible.
    fn convert(&self, quantity: f64, from: Option<&str>, to: Option<&str>) -> Option<f64>;
}

/// Only identical units (after trim and lowercase) are compatible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameUnit;

impl UnitConversion for SameUnit {
    fn convert(&self, quantity: f64, from: Option<&str>, to: Option<&str>) -> Option<f64> {
        (normalize_unit(from) == normalize_unit(to)).then_some(quantity)
    }
}

/// One ingredient line to be covered.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub is_optional: bool,
}

/// One pantry row as seen by the check.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub item_id: Uuid,
    pub quantity: f64,
    pub unit: Option<String>,
    pub expiry_date: Option<OffsetDateTime>,
}

impl Holding {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiry_date.is_some_and(|exp| exp < now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientCheck {
    pub item_id: Uuid,
    pub unit: Option<String>,
    pub need: f64,
    pub have: f64,
}

impl IngredientCheck {
    pub fn shortfall(&self) -> f64 {
        let gap = self.need - self.have;
        if gap > EPSILON {
            gap
        } else {
            0.0
        }
    }

    pub fn is_sufficient(&self) -> bool {
        self.shortfall() == 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SufficiencyReport {
    pub checks: Vec<IngredientCheck>,
}

impl SufficiencyReport {
    pub fn all_sufficient(&self) -> bool {
        self.checks.iter().all(IngredientCheck::is_sufficient)
    }

    /// Lines the pantry does not fully cover.
    pub fn missing(&self) -> impl Iterator<Item = &IngredientCheck> {
        self.checks.iter().filter(|c| !c.is_sufficient())
    }
}

/// Sum requirements per (item, unit), ignoring optional lines, in a stable order.
pub fn aggregate(requirements: &[Requirement]) -> BTreeMap<(Uuid, Option<String>), f64> {
    let mut totals: BTreeMap<(Uuid, Option<String>), f64> = BTreeMap::new();
    for req in requirements.iter().filter(|r| !r.is_optional) {
        let key = (req.item_id, normalize_unit(req.unit.as_deref()));
        *totals.entry(key).or_insert(0.0) += req.quantity;
    }
    totals
}

/// Compare requirements with holdings.
///
/// Expired holdings are ignored. A holding is consumed as it is allocated so
/// the same pantry stock never covers two lines. Holdings whose unit cannot
/// be converted to the requirement's unit count for nothing.
pub fn evaluate(
    requirements: &[Requirement],
    holdings: &[Holding],
    now: OffsetDateTime,
    units: &dyn UnitConversion,
) -> SufficiencyReport {
    let mut remaining: Vec<(usize, f64)> = holdings
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_expired(now) && h.quantity > 0.0)
        .map(|(i, h)| (i, h.quantity))
        .collect();

    let mut checks = Vec::new();
    for ((item_id, unit), need) in aggregate(requirements) {
        let mut have = 0.0;
        for (idx, left) in remaining.iter_mut() {
            let holding = &holdings[*idx];
            if holding.item_id != item_id || *left <= EPSILON {
                continue;
            }
            let still_needed = need - have;
            if still_needed <= EPSILON {
                break;
            }
            let Some(available) = units.convert(*left, holding.unit.as_deref(), unit.as_deref())
            else {
                continue;
            };
            let taken = available.min(still_needed);
            have += taken;
            *left = match units.convert(taken, unit.as_deref(), holding.unit.as_deref()) {
                Some(back) => (*left - back).max(0.0),
                None => 0.0,
            };
        }
        checks.push(IngredientCheck {
            item_id,
            unit,
            need,
            have,
        });
    }
    SufficiencyReport { checks }
}

#[cfg(test)]
mod sufficiency_tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-01-02 12:00 UTC);

    fn req(item: Uuid, qty: f64, unit: Option<&str>) -> Requirement {
        Requirement {
            item_id: item,
            quantity: qty,
            unit: unit.map(String::from),
            is_optional: false,
        }
    }

    fn hold(item: Uuid, qty: f64, unit: Option<&str>) -> Holding {
        Holding {
            item_id: item,
            quantity: qty,
            unit: unit.map(String::from),
            expiry_date: None,
        }
    }

    #[test]
    fn partial_holding_leaves_shortfall() {
        let x = Uuid::new_v4();
        let report = evaluate(&[req(x, 3.0, None)], &[hold(x, 1.0, None)], NOW, &SameUnit);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].have, 1.0);
        assert_eq!(report.checks[0].shortfall(), 2.0);
        assert!(!report.all_sufficient());
    }

    #[test]
    fn enough_stock_is_sufficient() {
        let x = Uuid::new_v4();
        let report = evaluate(&[req(x, 200.0, Some("g"))], &[hold(x, 500.0, Some(" G "))], NOW, &SameUnit);
        assert!(report.all_sufficient());
        assert_eq!(report.missing().count(), 0);
    }

    #[test]
    fn optional_ingredients_are_ignored() {
        let x = Uuid::new_v4();
        let mut optional = req(x, 5.0, None);
        optional.is_optional = true;
        let report = evaluate(&[optional], &[], NOW, &SameUnit);
        assert!(report.checks.is_empty());
        assert!(report.all_sufficient());
    }

    #[test]
    fn expired_items_do_not_count() {
        let x = Uuid::new_v4();
        let mut stale = hold(x, 10.0, None);
        stale.expiry_date = Some(datetime!(2024-01-01 00:00 UTC));
        let mut fresh = hold(x, 1.0, None);
        fresh.expiry_date = Some(datetime!(2024-01-05 00:00 UTC));
        let report = evaluate(&[req(x, 2.0, None)], &[stale, fresh], NOW, &SameUnit);
        assert_eq!(report.checks[0].have, 1.0);
        assert_eq!(report.checks[0].shortfall(), 1.0);
    }

    #[test]
    fn unit_mismatch_is_conservatively_insufficient() {
        let x = Uuid::new_v4();
        let report = evaluate(&[req(x, 1.0, Some("cup"))], &[hold(x, 1000.0, Some("ml"))], NOW, &SameUnit);
        assert_eq!(report.checks[0].have, 0.0);
        assert_eq!(report.checks[0].shortfall(), 1.0);
    }

    #[test]
    fn duplicate_lines_are_summed_and_stock_is_not_double_counted() {
        let x = Uuid::new_v4();
        let report = evaluate(
            &[req(x, 2.0, None), req(x, 2.0, None)],
            &[hold(x, 3.0, None)],
            NOW,
            &SameUnit,
        );
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].need, 4.0);
        assert_eq!(report.checks[0].shortfall(), 1.0);
    }

    struct KiloGrams;

    impl UnitConversion for KiloGrams {
        fn convert(&self, quantity: f64, from: Option<&str>, to: Option<&str>) -> Option<f64> {
            match (from, to) {
                (Some(a), Some(b)) if a == b => Some(quantity),
                (Some("kg"), Some("g")) => Some(quantity * 1000.0),
                (Some("g"), Some("kg")) => Some(quantity / 1000.0),
                _ => None,
            }
        }
    }

    #[test]
    fn conversion_is_used_and_stock_is_shared_across_units() {
        let flour = Uuid::new_v4();
        let report = evaluate(
            &[req(flour, 500.0, Some("g")), req(flour, 1.0, Some("kg"))],
            &[hold(flour, 1.0, Some("kg"))],
            NOW,
            &KiloGrams,
        );
        // 1 kg covers 500 g fully, then 0.5 kg of the 1 kg line.
        let g_line = report.checks.iter().find(|c| c.unit.as_deref() == Some("g")).unwrap();
        let kg_line = report.checks.iter().find(|c| c.unit.as_deref() == Some("kg")).unwrap();
        assert!(g_line.is_sufficient());
        assert!((kg_line.shortfall() - 0.5).abs() < 1e-9);
    }
}
