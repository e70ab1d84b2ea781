//! Recommended-action lookup
//!
//! Actions are keyed by `(equipment_class, dominant reason code)` with a
//! reason-only fallback and a generic catch-all, so an unknown combination
//! degrades to generic guidance instead of an error.

use std::collections::HashMap;

/// Wildcard class for reason-only default entries.
const ANY_CLASS: &str = "*";

/// Fallback when neither the class nor the reason code is known.
const GENERIC_ACTION: &str = "Continue regular monitoring and schedule a routine inspection";

/// Lookup table for recommended maintenance actions.
#[derive(Debug, Clone)]
pub struct ActionTable {
    entries: HashMap<(String, String), String>,
}

impl ActionTable {
    /// Table seeded with the stock recommendations per reason code.
    pub fn with_defaults() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
        };
        table.insert(
            ANY_CLASS,
            super::reason::IMMINENT_FAILURE,
            "Schedule immediate maintenance: replace bearings, check lubrication, verify alignment, inspect electrical connections",
        );
        table.insert(
            ANY_CLASS,
            super::reason::SHORT_REMAINING_LIFE,
            "Plan maintenance within the remaining-life margin: inspect for unusual wear and check lubrication",
        );
        table.insert(
            ANY_CLASS,
            super::reason::FAILURE_RISK,
            "Inspect for unusual wear, check lubrication, and monitor closely until the next planned cycle",
        );
        table.insert(
            ANY_CLASS,
            "vibration_anomaly",
            "Monitor vibration levels and verify mounting and alignment",
        );
        table.insert(
            ANY_CLASS,
            "temperature_anomaly",
            "Check cooling and lubrication; verify thermal sensor calibration",
        );
        table.insert(
            ANY_CLASS,
            "pressure_anomaly",
            "Inspect seals and lines; verify pressure sensor calibration",
        );
        table.insert(
            ANY_CLASS,
            "power_anomaly",
            "Inspect electrical connections and load conditions",
        );
        table
    }

    /// Add or override an entry. Use `"*"` as the class for a reason-only
    /// default.
    pub fn insert(&mut self, equipment_class: &str, reason_code: &str, action: &str) {
        self.entries.insert(
            (equipment_class.to_string(), reason_code.to_string()),
            action.to_string(),
        );
    }

    /// Resolve an action for a class and dominant reason code. Never fails:
    /// exact match, then reason-only default, then the generic action.
    pub fn lookup(&self, equipment_class: &str, reason_code: &str) -> &str {
        self.entries
            .get(&(equipment_class.to_string(), reason_code.to_string()))
            .or_else(|| {
                self.entries
                    .get(&(ANY_CLASS.to_string(), reason_code.to_string()))
            })
            .map(String::as_str)
            .unwrap_or(GENERIC_ACTION)
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_specific_overrides_default() {
        let mut table = ActionTable::with_defaults();
        table.insert("cnc_mill", "vibration_anomaly", "Check spindle bearings");

        assert_eq!(
            table.lookup("cnc_mill", "vibration_anomaly"),
            "Check spindle bearings"
        );
        assert_eq!(
            table.lookup("press", "vibration_anomaly"),
            "Monitor vibration levels and verify mounting and alignment"
        );
    }

    #[test]
    fn test_unknown_combination_fails_soft() {
        let table = ActionTable::with_defaults();
        assert_eq!(table.lookup("unknown", "made_up_reason"), GENERIC_ACTION);
    }
}
