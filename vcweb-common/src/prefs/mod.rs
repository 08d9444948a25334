//! User preference documents
//!
//! Preferences come in two independent subsets:
//! - **global**: client runtime limits (CPU, network, disk, scheduling windows)
//! - **project**: resource share, device toggles, notification settings
//!
//! Each subset is stored as one encoded text blob per user. A blob holds the
//! base values plus optional per-venue (home/work/school) overrides.
//!
//! # Pipeline
//!
//! ```rust,ignore
//! let text = store.load(user_id, subset).await?;
//! let doc = codec::decode_or_default(&text, subset);
//! let outcome = validator::validate(Schema::for_subset(subset), &raw_fields);
//! let doc = merger::apply_update(doc, subset, venue.as_ref(), outcome.validated)?;
//! store.save(user_id, subset, &codec::encode(&doc)).await?;
//! ```
//!
//! There is no locking around load/save: two concurrent edits of the same
//! document race and the last write wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod codec;
pub mod document;
pub mod merger;
pub mod schema;
pub mod store;
pub mod validator;

pub use codec::{decode, decode_or_default, encode, DecodeError};
pub use document::{
    DocumentState, FieldMap, OpaqueElement, PrefSet, PrefValue, PreferenceDocument, VenueName,
};
pub use merger::{
    add_venue, apply_update, remove_venue, reset_to_defaults, resolve, resolve_with_defaults,
};
pub use schema::{FieldKind, FieldSpec, Schema};
pub use store::{MemoryPreferenceStore, PreferenceStore};
#[cfg(feature = "sqlx")]
pub use store::SqlitePreferenceStore;
pub use validator::{restrict_to_venue, validate, FieldError, ValidationOutcome};

/// Preference domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Global,
    Project,
}

impl Subset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subset::Global => "global",
            Subset::Project => "project",
        }
    }

    /// Root element name of the encoded form
    pub fn root_element(&self) -> &'static str {
        match self {
            Subset::Global => "global_preferences",
            Subset::Project => "project_preferences",
        }
    }

    pub fn from_root_element(name: &str) -> Option<Self> {
        match name {
            "global_preferences" => Some(Subset::Global),
            "project_preferences" => Some(Subset::Project),
            _ => None,
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subset {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Subset::Global),
            "project" => Ok(Subset::Project),
            other => Err(PrefsError::UnknownSubset(other.to_string())),
        }
    }
}

/// Errors from document-level operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefsError {
    #[error("unknown preference subset: {0}")]
    UnknownSubset(String),

    #[error("invalid venue name: {0:?}")]
    InvalidVenueName(String),

    /// Venue is not defined (in the document, or in the project's venue list)
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("venue already has separate preferences: {0}")]
    VenueExists(String),

    #[error("document holds {document} preferences, not {requested}")]
    SubsetMismatch { document: Subset, requested: Subset },
}
