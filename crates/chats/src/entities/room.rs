use serde::{Deserialize, Serialize};

/// Persisted descriptor of a room: identity and display name.
///
/// Runtime state (client sets, publish capability) lives in
/// [`crate::room::Room`]; only this descriptor crosses the wire and
/// the store boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Store-assigned identity; empty until first saved
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl RoomInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}
