use serde::{Deserialize, Serialize};

/// A user as the core sees it: identity plus display name, owned by
/// the store and attached to messages for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identity; empty until first saved
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}
