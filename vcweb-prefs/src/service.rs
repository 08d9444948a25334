//! Preference page actions
//!
//! Every action runs the same pipeline: load the stored text, decode it
//! (falling back to defaults), apply the change, encode and save. Nothing
//! is cached between requests, and two requests editing the same document
//! at once race: the later save wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use vcweb_common::prefs::{
    add_venue, apply_update, decode_or_default, encode, remove_venue, reset_to_defaults,
    resolve_with_defaults, restrict_to_venue, validate, DocumentState, FieldError, FieldMap,
    PreferenceDocument, PreferenceStore, PrefsError, Schema, Subset, VenueName,
};

/// Message shown when a save does not go through
pub const STORE_WRITE_MESSAGE: &str = "Couldn't update preferences. Try again later.";

/// What the user asked to do with one subset of their preferences
#[derive(Debug, Clone)]
pub enum Action {
    /// Show base or venue values
    View { venue: Option<VenueName> },
    /// Submit form fields for base (`None`) or a venue
    Edit {
        venue: Option<VenueName>,
        fields: BTreeMap<String, String>,
    },
    /// Give a venue separate preferences
    AddVenue { venue: VenueName },
    /// Drop a venue's separate preferences
    RemoveVenue { venue: VenueName },
    /// Replace everything with the documented defaults
    ResetDefaults,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error(transparent)]
    Prefs(#[from] PrefsError),

    #[error("{} invalid field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{}", STORE_WRITE_MESSAGE)]
    StoreWrite,

    #[error("preference store error: {0}")]
    Store(String),
}

/// A configured venue and whether it currently has its own preferences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueSummary {
    pub name: VenueName,
    pub has_overrides: bool,
}

/// Everything the preferences page shows for one subset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefsView {
    pub subset: Subset,
    /// Venue being shown, `None` for base
    pub venue: Option<VenueName>,
    pub state: DocumentState,
    pub venues: Vec<VenueSummary>,
    /// Stored base values
    pub base: FieldMap,
    /// The venue's own values; `None` when it has none
    pub overrides: Option<FieldMap>,
    /// Values in effect, defaults filled in
    pub effective: FieldMap,
    pub mod_time: Option<i64>,
}

pub struct PreferenceService {
    store: Arc<dyn PreferenceStore>,
    venues: Vec<VenueName>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn PreferenceStore>, venues: Vec<VenueName>) -> Self {
        Self { store, venues }
    }

    pub fn venues(&self) -> &[VenueName] {
        &self.venues
    }

    pub async fn execute(
        &self,
        user_id: i64,
        subset: Subset,
        action: Action,
    ) -> Result<PrefsView, ServiceError> {
        match action {
            Action::View { venue } => {
                self.check_venue(venue.as_ref())?;
                let doc = self.load(user_id, subset).await?;
                Ok(self.view(&doc, venue))
            }

            Action::Edit { venue, fields } => {
                self.check_venue(venue.as_ref())?;
                let schema = Schema::for_subset(subset);
                let outcome = restrict_to_venue(schema, validate(schema, &fields), venue.as_ref());
                if !outcome.is_ok() {
                    debug!(
                        "Rejected {} edit for user {}: {} error(s)",
                        subset,
                        user_id,
                        outcome.errors.len()
                    );
                    return Err(ServiceError::Validation(outcome.errors));
                }

                let doc = self.load(user_id, subset).await?;
                if outcome.validated.is_empty() {
                    return Ok(self.view(&doc, venue));
                }
                let count = outcome.validated.len();
                let doc = apply_update(doc, subset, venue.as_ref(), outcome.validated)?;
                let doc = self.save(user_id, doc).await?;
                info!(
                    "User {} updated {} {} preference(s) in {}",
                    user_id,
                    count,
                    subset,
                    venue.as_ref().map_or("base", VenueName::as_str)
                );
                Ok(self.view(&doc, venue))
            }

            Action::AddVenue { venue } => {
                self.check_venue(Some(&venue))?;
                let doc = self.load(user_id, subset).await?;
                let doc = add_venue(doc, &venue)?;
                let doc = self.save(user_id, doc).await?;
                info!("User {} added {} venue {}", user_id, subset, venue);
                Ok(self.view(&doc, Some(venue)))
            }

            Action::RemoveVenue { venue } => {
                self.check_venue(Some(&venue))?;
                let doc = self.load(user_id, subset).await?;
                if !doc.has_venue(&venue) {
                    return Ok(self.view(&doc, None));
                }
                let doc = self.save(user_id, remove_venue(doc, &venue)).await?;
                info!("User {} removed {} venue {}", user_id, subset, venue);
                Ok(self.view(&doc, None))
            }

            Action::ResetDefaults => {
                // Loading first reports an unknown user as such
                self.load(user_id, subset).await?;
                let doc = self.save(user_id, reset_to_defaults(subset)).await?;
                info!("User {} reset {} preferences to defaults", user_id, subset);
                Ok(self.view(&doc, None))
            }
        }
    }

    /// Venue names must be on the configured list
    fn check_venue(&self, venue: Option<&VenueName>) -> Result<(), PrefsError> {
        match venue {
            Some(v) if !self.venues.contains(v) => Err(PrefsError::UnknownVenue(v.to_string())),
            _ => Ok(()),
        }
    }

    async fn load(&self, user_id: i64, subset: Subset) -> Result<PreferenceDocument, ServiceError> {
        let text = self.store.load(user_id, subset).await.map_err(|e| match e {
            vcweb_common::Error::NotFound(_) => ServiceError::UserNotFound(user_id),
            other => {
                error!("Failed to load {} preferences for user {}: {}", subset, user_id, other);
                ServiceError::Store(other.to_string())
            }
        })?;
        Ok(decode_or_default(&text, subset))
    }

    /// Stamp and store; the document is only returned if the write went through
    async fn save(
        &self,
        user_id: i64,
        mut doc: PreferenceDocument,
    ) -> Result<PreferenceDocument, ServiceError> {
        doc.mod_time = Some(chrono::Utc::now().timestamp());
        let text = encode(&doc);

        match self.store.save(user_id, doc.subset, &text).await {
            Ok(true) => Ok(doc),
            Ok(false) => {
                error!("{} preferences for user {} were not written", doc.subset, user_id);
                Err(ServiceError::StoreWrite)
            }
            Err(e) => {
                error!("Failed to save {} preferences for user {}: {}", doc.subset, user_id, e);
                Err(ServiceError::StoreWrite)
            }
        }
    }

    fn view(&self, doc: &PreferenceDocument, venue: Option<VenueName>) -> PrefsView {
        let overrides = venue
            .as_ref()
            .and_then(|v| doc.venue(v).ok())
            .map(|set| set.fields.clone());

        PrefsView {
            subset: doc.subset,
            effective: resolve_with_defaults(doc, venue.as_ref()),
            venue,
            state: doc.state(),
            venues: self
                .venues
                .iter()
                .map(|name| VenueSummary {
                    name: name.clone(),
                    has_overrides: doc.has_venue(name),
                })
                .collect(),
            base: doc.base.fields.clone(),
            overrides,
            mod_time: doc.mod_time,
        }
    }
}
