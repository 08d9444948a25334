//! Checking submitted form values against the schema
//!
//! Validation never fails as a whole: each field is parsed and checked on
//! its own, and every problem is reported together so the user can fix all
//! of them in one round trip.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::document::{FieldMap, VenueName};
use super::schema::Schema;

/// A rejected field and the reason, e.g. `max_cpu_pct: value 200 out of range [1, 100]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Fields that passed plus fields that did not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub validated: FieldMap,
    pub errors: Vec<FieldError>,
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse and range-check raw form values
///
/// Fields absent from `raw` are not being updated and are not reported.
/// Names the schema does not define are errors.
pub fn validate(schema: &Schema, raw: &BTreeMap<String, String>) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for (name, value) in raw {
        let Some(spec) = schema.field(name) else {
            outcome.errors.push(FieldError::new(name, "unknown field"));
            continue;
        };
        match spec.parse_checked(value) {
            Ok(parsed) => {
                outcome.validated.insert(name.clone(), parsed);
            }
            Err(reason) => outcome.errors.push(FieldError::new(name, reason)),
        }
    }

    outcome
}

/// Reject base-only fields when the update targets a venue
pub fn restrict_to_venue(
    schema: &Schema,
    mut outcome: ValidationOutcome,
    venue: Option<&VenueName>,
) -> ValidationOutcome {
    if venue.is_none() {
        return outcome;
    }

    let base_only: Vec<String> = outcome
        .validated
        .keys()
        .filter(|name| schema.field(name).is_some_and(|spec| !spec.venue_scoped))
        .cloned()
        .collect();
    for name in base_only {
        outcome.validated.remove(&name);
        outcome
            .errors
            .push(FieldError::new(name, "cannot be set per venue"));
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::document::PrefValue;
    use crate::prefs::Subset;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_fields_pass() {
        let schema = Schema::for_subset(Subset::Global);
        let outcome = validate(
            schema,
            &raw(&[("max_cpu_pct", "50"), ("run_on_batteries", "1")]),
        );
        assert!(outcome.is_ok());
        assert_eq!(outcome.validated["max_cpu_pct"], PrefValue::Int(50));
        assert_eq!(outcome.validated["run_on_batteries"], PrefValue::Bool(true));
    }

    #[test]
    fn test_all_errors_reported() {
        let schema = Schema::for_subset(Subset::Global);
        let outcome = validate(
            schema,
            &raw(&[
                ("max_cpu_pct", "200"),
                ("idle_time_to_run", "soon"),
                ("frobnicate", "1"),
                ("run_on_batteries", "0"),
            ]),
        );

        assert_eq!(outcome.errors.len(), 3);
        assert_eq!(outcome.validated.len(), 1);
        let messages: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert!(messages.contains(&"max_cpu_pct: value 200 out of range [1, 100]".to_string()));
        assert!(messages.contains(&"idle_time_to_run: invalid whole number".to_string()));
        assert!(messages.contains(&"frobnicate: unknown field".to_string()));
    }

    #[test]
    fn test_empty_input_is_empty_outcome() {
        let outcome = validate(Schema::for_subset(Subset::Project), &BTreeMap::new());
        assert_eq!(outcome, ValidationOutcome::default());
    }

    #[test]
    fn test_base_only_fields_rejected_for_venue() {
        let schema = Schema::for_subset(Subset::Project);
        let outcome = validate(
            schema,
            &raw(&[("send_email", "0"), ("resource_share", "50")]),
        );
        let home: VenueName = "home".parse().unwrap();

        let for_venue = restrict_to_venue(schema, outcome.clone(), Some(&home));
        assert_eq!(
            for_venue.errors,
            vec![FieldError::new("send_email", "cannot be set per venue")]
        );
        assert!(for_venue.validated.contains_key("resource_share"));

        let for_base = restrict_to_venue(schema, outcome.clone(), None);
        assert_eq!(for_base, outcome);
    }
}
