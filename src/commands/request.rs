//! Command parameters

use serde::{Deserialize, Serialize};

use crate::types::{EventCategory, Region};

/// Parameters of a `lookup` command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupRequest {
    /// Staff actor issuing the command; owner of the selection
    pub issuer_id: String,
    /// Restrict to one actor
    #[serde(default)]
    pub actor: Option<String>,
    /// Explicit region; takes precedence over the selection
    #[serde(default)]
    pub region: Option<Region>,
    /// Use the issuer's two-corner selection as the region
    #[serde(default)]
    pub use_selection: bool,
    /// How far back to look, e.g. `"1h"` or `"2d12h"`
    pub time: String,
    /// Result cap; the configured lookup limit when absent
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LookupRequest {
    pub fn actor(issuer_id: impl Into<String>, actor: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            actor: Some(actor.into()),
            time: time.into(),
            ..Default::default()
        }
    }

    pub fn region(issuer_id: impl Into<String>, region: Region, time: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            region: Some(region),
            time: time.into(),
            ..Default::default()
        }
    }

    /// Scope to the issuer's current selection
    pub fn selection(mut self) -> Self {
        self.use_selection = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Parameters of a `rollback` command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub issuer_id: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub use_selection: bool,
    pub time: String,
    /// All categories when absent
    #[serde(default)]
    pub categories: Option<Vec<EventCategory>>,
}

impl RollbackRequest {
    pub fn actor(issuer_id: impl Into<String>, actor: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            actors: vec![actor.into()],
            time: time.into(),
            ..Default::default()
        }
    }

    pub fn region(issuer_id: impl Into<String>, region: Region, time: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            region: Some(region),
            time: time.into(),
            ..Default::default()
        }
    }

    pub fn selection(mut self) -> Self {
        self.use_selection = true;
        self
    }

    pub fn only(mut self, categories: &[EventCategory]) -> Self {
        self.categories = Some(categories.to_vec());
        self
    }
}
