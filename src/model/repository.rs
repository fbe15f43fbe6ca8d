use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Organisations nest; a repository belongs to every organisation above its own.
    #[serde(default)]
    pub super_organisation_id: Option<Id>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Organisation {
    pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            super_organisation_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn within(mut self, super_organisation_id: impl Into<Id>) -> Self {
        self.super_organisation_id = Some(super_organisation_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Id,
    pub organisation_id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Only primary repositories can be forked from
    #[serde(default)]
    pub primary: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Repository {
    pub fn new(id: impl Into<Id>, organisation_id: impl Into<Id>, primary: bool) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            organisation_id: organisation_id.into(),
            description: None,
            primary,
            created_at: Utc::now(),
        }
    }
}
