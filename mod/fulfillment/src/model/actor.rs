use serde::{Deserialize, Serialize};

/// The staff member performing a workflow action.
///
/// Every state-changing endpoint carries these fields in its body. Initials
/// are optional on the wire — the dual-control policy derives them from the
/// name when absent (physical paper-trail convention: every checkpoint gets
/// initials next to the timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "actorId")]
    pub id: String,

    #[serde(rename = "actorName")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,
}

impl Actor {
    /// Test/convenience constructor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            initials: None,
        }
    }

    pub fn with_initials(mut self, initials: impl Into<String>) -> Self {
        self.initials = Some(initials.into());
        self
    }
}
