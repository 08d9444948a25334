//! Applying updates to a document and resolving effective values
//!
//! Venue overrides are flat: a venue value replaces the base value of the
//! same field, and fields the venue does not set fall back to base.

use super::document::{FieldMap, PrefSet, PreferenceDocument, VenueName};
use super::schema::Schema;
use super::{PrefsError, Subset};

/// Write validated fields into base (`venue = None`) or one venue
///
/// The venue entry is created when missing, unless there is nothing to
/// write.
pub fn apply_update(
    mut doc: PreferenceDocument,
    subset: Subset,
    venue: Option<&VenueName>,
    validated: FieldMap,
) -> Result<PreferenceDocument, PrefsError> {
    if doc.subset != subset {
        return Err(PrefsError::SubsetMismatch {
            document: doc.subset,
            requested: subset,
        });
    }
    if validated.is_empty() {
        return Ok(doc);
    }

    let target = match venue {
        None => &mut doc.base,
        Some(venue) => doc.venues.entry(venue.clone()).or_default(),
    };
    target.fields.extend(validated);
    Ok(doc)
}

/// Effective values for a venue: base overlaid with the venue's fields
///
/// A venue without overrides, or `None`, resolves to base.
pub fn resolve(doc: &PreferenceDocument, venue: Option<&VenueName>) -> FieldMap {
    let mut effective = doc.base.fields.clone();
    if let Some(set) = venue.and_then(|v| doc.venues.get(v)) {
        effective.extend(set.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    effective
}

/// `resolve` laid over the schema defaults, so every field has a value
pub fn resolve_with_defaults(doc: &PreferenceDocument, venue: Option<&VenueName>) -> FieldMap {
    let mut effective = Schema::for_subset(doc.subset).defaults();
    effective.extend(resolve(doc, venue));
    effective
}

/// Give a venue its own preferences, starting from the current base values
pub fn add_venue(
    mut doc: PreferenceDocument,
    venue: &VenueName,
) -> Result<PreferenceDocument, PrefsError> {
    if doc.has_venue(venue) {
        return Err(PrefsError::VenueExists(venue.to_string()));
    }

    let schema = Schema::for_subset(doc.subset);
    let mut fields = resolve_with_defaults(&doc, None);
    fields.retain(|name, _| schema.field(name).is_some_and(|spec| spec.venue_scoped));
    doc.venues.insert(
        venue.clone(),
        PrefSet {
            fields,
            opaque: Vec::new(),
        },
    );
    Ok(doc)
}

/// Drop a venue's overrides; a venue that has none is left alone
pub fn remove_venue(mut doc: PreferenceDocument, venue: &VenueName) -> PreferenceDocument {
    doc.venues.remove(venue);
    doc
}

/// Document holding the documented defaults and no venues
pub fn reset_to_defaults(subset: Subset) -> PreferenceDocument {
    let mut doc = PreferenceDocument::empty(subset);
    doc.base.fields = Schema::for_subset(subset).defaults();
    doc
}
