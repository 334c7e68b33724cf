use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    Detached,
    Added,
    Unchanged,
    Modified,
    Deleted,
}

impl EntityState {
    /// States in which property changes are recorded against original values
    pub fn tracks_changes(self) -> bool {
        matches!(self, EntityState::Unchanged | EntityState::Modified)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Detached => "Detached",
            EntityState::Added => "Added",
            EntityState::Unchanged => "Unchanged",
            EntityState::Modified => "Modified",
            EntityState::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// Identity of a tracked entity within its entity set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKey {
    /// Key property names and values, in key order
    Permanent(Vec<(String, serde_json::Value)>),
    /// Placeholder for an added entity whose key is not final yet
    Temporary(String),
}

impl EntityKey {
    pub fn is_temporary(&self) -> bool {
        matches!(self, EntityKey::Temporary(_))
    }

    pub fn values(&self) -> Vec<serde_json::Value> {
        match self {
            EntityKey::Permanent(pairs) => pairs.iter().map(|(_, v)| v.clone()).collect(),
            EntityKey::Temporary(_) => Vec::new(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Permanent(pairs) => write!(
                f,
                "({})",
                pairs.iter().map(|(name, value)| format!("{name}={value}")).join(", ")
            ),
            EntityKey::Temporary(id) => write!(f, "(temporary {id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_display_lists_pairs() {
        let key = EntityKey::Permanent(vec![
            ("Id".to_string(), json!(7)),
            ("Region".to_string(), json!("EU")),
        ]);
        assert_eq!(key.to_string(), "(Id=7, Region=\"EU\")");
        assert!(!key.is_temporary());
        assert_eq!(key.values(), vec![json!(7), json!("EU")]);
    }

    #[test]
    fn test_only_attached_states_track_changes() {
        assert!(EntityState::Unchanged.tracks_changes());
        assert!(EntityState::Modified.tracks_changes());
        assert!(!EntityState::Added.tracks_changes());
        assert!(!EntityState::Deleted.tracks_changes());
    }
}
