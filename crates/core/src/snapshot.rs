use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("thread snapshot is not decodable: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("thread snapshot has no thread object")]
    MissingThread,
    #[error("failed to load thread snapshot: {0}")]
    Load(String),
}

/// Persisted thread as returned by a thread read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThreadSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub turns: Vec<SnapshotTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotTurn {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Raw items; normalized into entries by the reconciler.
    #[serde(default)]
    pub items: Vec<Value>,
}

impl ThreadSnapshot {
    /// Accepts a bare thread object or a `{"thread": {...}}` response wrapper.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let thread = match value {
            Value::Object(mut map) if map.contains_key("thread") => {
                map.remove("thread").ok_or(SnapshotError::MissingThread)?
            }
            Value::Object(map) => Value::Object(map),
            _ => return Err(SnapshotError::MissingThread),
        };
        if !thread.is_object() {
            return Err(SnapshotError::MissingThread);
        }
        Ok(serde_json::from_value(thread)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_wrapped_and_bare_threads() {
        let bare = ThreadSnapshot::from_value(json!({ "id": "th", "turns": [{ "id": "T1", "status": "completed" }] })).unwrap();
        assert_eq!(bare.turns[0].id, "T1");
        assert!(bare.turns[0].items.is_empty());

        let wrapped = ThreadSnapshot::from_value(json!({ "thread": { "id": "th", "cwd": "/repo" } })).unwrap();
        assert_eq!(wrapped.cwd.as_deref(), Some("/repo"));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(ThreadSnapshot::from_value(json!([1, 2])), Err(SnapshotError::MissingThread)));
        assert!(matches!(ThreadSnapshot::from_json("{"), Err(SnapshotError::Decode(_))));
        assert!(matches!(
            ThreadSnapshot::from_value(json!({ "turns": "nope" })),
            Err(SnapshotError::Decode(_))
        ));
    }
}
