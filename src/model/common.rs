use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// A localised piece of text such as a title or a synonym.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalisableText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl LocalisableText {
    pub fn new(text: impl Into<String>, lang: Option<&str>) -> Self {
        Self {
            text: text.into(),
            lang: lang.map(str::to_string),
        }
    }
}

/// Points at one version of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    pub entity_id: Id,
    pub version: i32,
}

impl VersionRef {
    pub fn new(entity_id: impl Into<Id>, version: i32) -> Self {
        Self {
            entity_id: entity_id.into(),
            version,
        }
    }
}
