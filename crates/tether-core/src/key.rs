//! Identity of one mutable field of one entity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one mutable field of one entity.
///
/// Rendered as `kind-id` (e.g. `victim-42`) or `kind-id.field`
/// (e.g. `victim-42.status`). Two keys are equal only when kind, id and
/// field all match, so the same entity can carry independent keys per field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    kind: String,
    id: String,
    field: Option<String>,
}

impl SyncKey {
    /// Key for a whole-row field identified by entity kind and id.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
            field: None,
        }
    }

    /// Narrow this key to a single named field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)?;
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SyncKey;

    #[test]
    fn display_matches_row_key_format() {
        assert_eq!(SyncKey::new("victim", 42).to_string(), "victim-42");
        assert_eq!(
            SyncKey::new("victim", 42).with_field("status").to_string(),
            "victim-42.status"
        );
    }

    #[test]
    fn field_distinguishes_keys() {
        let row = SyncKey::new("victim", 7);
        let status = SyncKey::new("victim", 7).with_field("status");
        assert_ne!(row, status);
        assert_eq!(status.field(), Some("status"));
        assert_eq!(status.kind(), "victim");
        assert_eq!(status.id(), "7");
    }
}
