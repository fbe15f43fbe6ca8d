use serde::{Deserialize, Serialize};

use crate::model::{Id, LocalisableText};

/// Where and how to fork an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkingInstruction {
    pub organisation_id: Id,
    pub repository_id: Id,
    /// Also fork every transitive subclass
    #[serde(default)]
    pub cascade: bool,
    /// Bring existing forks up to date instead of skipping them
    #[serde(default)]
    pub update: bool,
}

impl ForkingInstruction {
    pub fn new(organisation_id: impl Into<Id>, repository_id: impl Into<Id>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
            repository_id: repository_id.into(),
            cascade: false,
            update: false,
        }
    }

    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn update(mut self) -> Self {
        self.update = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForkOrigin {
    pub id: Id,
    pub titles: Vec<LocalisableText>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForkSummary {
    pub id: Id,
    pub repository_id: Id,
    pub repository_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForkingStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ForkOrigin>,
    pub forks: Vec<ForkSummary>,
}
