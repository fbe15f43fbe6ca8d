use serde::{Deserialize, Serialize};

/// Already-authorised caller of an ontology operation. Permission checks happen before the
/// operation is invoked; the core only records who authored new versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: None,
        }
    }

    pub fn with_name(user_id: impl Into<String>, user_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name,
        }
    }

    /// Caller for maintenance tasks and anonymous development requests
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_name: Some("System".to_string()),
        }
    }

    pub fn author(&self) -> Option<String> {
        Some(self.user_id.clone())
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::system()
    }
}
