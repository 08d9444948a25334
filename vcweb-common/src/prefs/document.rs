//! In-memory preference document model
//!
//! A document holds the base ("generic") preference set for one subset plus
//! zero or more named venue sets that override base fields one by one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::{PrefsError, Subset};

/// Field name → typed value. Presence is the "set" marker.
pub type FieldMap = BTreeMap<String, PrefValue>;

/// A typed preference value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrefValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Choice(String),
}

impl PrefValue {
    /// Text form used inside encoded documents (booleans as `0`/`1`)
    pub fn to_encoded(&self) -> String {
        match self {
            PrefValue::Int(v) => v.to_string(),
            PrefValue::Float(v) => v.to_string(),
            PrefValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            PrefValue::Choice(v) => v.clone(),
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Int(v) => write!(f, "{}", v),
            PrefValue::Float(v) => write!(f, "{}", v),
            PrefValue::Bool(v) => write!(f, "{}", v),
            PrefValue::Choice(v) => f.write_str(v),
        }
    }
}

/// An element the schema does not know, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueElement {
    /// Element tag name
    pub name: String,
    /// Full element text, from `<name` to the matching close tag
    pub raw: String,
}

/// One set of preference values (base or a single venue)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrefSet {
    pub fields: FieldMap,
    pub opaque: Vec<OpaqueElement>,
}

impl PrefSet {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.opaque.is_empty()
    }

    /// Overlay `other` onto this set; fields in `other` win
    pub fn absorb(&mut self, other: PrefSet) {
        self.fields.extend(other.fields);
        self.opaque.extend(other.opaque);
    }
}

/// Validated venue name
///
/// Lowercase ASCII letters, digits and `_`, 1 to 32 characters. Safe to
/// embed in an attribute value without escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VenueName(String);

impl VenueName {
    pub const MAX_LEN: usize = 32;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VenueName {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if valid {
            Ok(VenueName(s.to_string()))
        } else {
            Err(PrefsError::InvalidVenueName(s.to_string()))
        }
    }
}

impl fmt::Display for VenueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VenueName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Whether any venue overrides exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    NoOverrides,
    HasOverrides,
}

/// A user's preference set for one subset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceDocument {
    pub subset: Subset,
    /// Unix seconds of the last save
    pub mod_time: Option<i64>,
    pub base: PrefSet,
    pub venues: BTreeMap<VenueName, PrefSet>,
}

impl PreferenceDocument {
    /// Empty document: no base fields, no venues
    pub fn empty(subset: Subset) -> Self {
        Self {
            subset,
            mod_time: None,
            base: PrefSet::default(),
            venues: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> DocumentState {
        if self.venues.is_empty() {
            DocumentState::NoOverrides
        } else {
            DocumentState::HasOverrides
        }
    }

    pub fn has_venue(&self, venue: &VenueName) -> bool {
        self.venues.contains_key(venue)
    }

    /// Override set of a venue, or `UnknownVenue`
    pub fn venue(&self, venue: &VenueName) -> Result<&PrefSet, PrefsError> {
        self.venues
            .get(venue)
            .ok_or_else(|| PrefsError::UnknownVenue(venue.to_string()))
    }

    pub fn venue_names(&self) -> Vec<VenueName> {
        self.venues.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_name_accepts_simple_names() {
        for name in ["home", "work", "school", "lab_2"] {
            let venue: VenueName = name.parse().unwrap();
            assert_eq!(venue.as_str(), name);
        }
    }

    #[test]
    fn test_venue_name_rejects_unsafe_names() {
        let too_long = "a".repeat(VenueName::MAX_LEN + 1);
        for name in ["", "Home", "wo rk", "a\"b", "<x>", too_long.as_str()] {
            assert!(name.parse::<VenueName>().is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_bool_encodes_as_digit() {
        assert_eq!(PrefValue::Bool(true).to_encoded(), "1");
        assert_eq!(PrefValue::Bool(false).to_encoded(), "0");
        assert_eq!(PrefValue::Float(0.5).to_encoded(), "0.5");
    }

    #[test]
    fn test_state_tracks_venues() {
        let mut doc = PreferenceDocument::empty(Subset::Global);
        assert_eq!(doc.state(), DocumentState::NoOverrides);

        let mut set = PrefSet::default();
        set.fields.insert("max_cpu_pct".to_string(), PrefValue::Int(50));
        doc.venues.insert("work".parse().unwrap(), set);
        assert_eq!(doc.state(), DocumentState::HasOverrides);
    }

    #[test]
    fn test_missing_venue_lookup_is_unknown_venue() {
        let doc = PreferenceDocument::empty(Subset::Project);
        let venue: VenueName = "home".parse().unwrap();
        assert!(matches!(doc.venue(&venue), Err(PrefsError::UnknownVenue(_))));
    }
}
