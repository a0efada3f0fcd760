//! Common types used across objwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ObjwatchError;

/// Opaque identifier of a watched object.
///
/// Unique within one ingest batch; the same id may show up again in later
/// batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(i64);

impl ObjectId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ObjectId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = ObjwatchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| ObjwatchError::InvalidObjectId(s.to_string()))
    }
}

/// Liveness status of one object, produced by a single successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetail {
    pub id: ObjectId,
    pub online: bool,
    /// Completion time of the fetch that produced this detail.
    pub last_seen: DateTime<Utc>,
}

impl ObjectDetail {
    /// Detail stamped with the current time.
    pub fn observed(id: ObjectId, online: bool) -> Self {
        Self::seen_at(id, online, Utc::now())
    }

    pub fn seen_at(id: ObjectId, online: bool, last_seen: DateTime<Utc>) -> Self {
        Self {
            id,
            online,
            last_seen,
        }
    }
}

/// Ingest payload: one batch of object ids pushed by the upstream notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectList {
    pub object_ids: Vec<ObjectId>,
}

impl ObjectList {
    /// Decode a callback body.
    pub fn from_json(body: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn len(&self) -> usize {
        self.object_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_ids.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_object_list_from_json() {
        let list = ObjectList::from_json(br#"{"object_ids":[1,2,3]}"#).unwrap();
        assert_eq!(
            list.object_ids,
            vec![ObjectId::new(1), ObjectId::new(2), ObjectId::new(3)]
        );
    }

    #[test]
    fn test_object_list_rejects_malformed_body() {
        assert!(ObjectList::from_json(b"{\"object_ids\": [1, \"two\"]}").is_err());
        assert!(ObjectList::from_json(b"not json").is_err());
        assert!(ObjectList::from_json(b"").is_err());
    }

    #[test]
    fn test_object_list_missing_field_is_error() {
        assert!(ObjectList::from_json(b"{}").is_err());
    }

    #[test]
    fn test_object_id_from_str() {
        assert_eq!(" 42 ".parse::<ObjectId>().unwrap(), ObjectId::new(42));
        assert!(matches!(
            "abc".parse::<ObjectId>(),
            Err(ObjwatchError::InvalidObjectId(_))
        ));
    }

    #[test]
    fn test_observed_stamps_current_time() {
        let before = Utc::now();
        let detail = ObjectDetail::observed(ObjectId::new(1), false);
        assert!(detail.last_seen >= before);
        assert!(!detail.online);
    }
}
