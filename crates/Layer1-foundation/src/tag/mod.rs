//! Image tag snapshots
//!
//! The runner only reads tags; refreshing them against the registry happens
//! elsewhere on its own schedule and is published through [`InMemoryTagStorage::replace_all`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A version resolved to its content digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    pub version: String,
    pub digest: String,
}

impl ImageTag {
    pub fn new(version: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            digest: digest.into(),
        }
    }
}

/// Read-only view over the latest tag snapshot. Must be safe under concurrent reads.
pub trait ImageTagStorage: Send + Sync {
    fn get(&self, version: &str) -> Option<ImageTag>;
}

/// Tag snapshot held in memory
#[derive(Debug, Default)]
pub struct InMemoryTagStorage {
    tags: RwLock<HashMap<String, ImageTag>>,
}

impl InMemoryTagStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `version -> digest` map
    pub fn from_map(map: HashMap<String, String>) -> Self {
        let storage = Self::new();
        storage.replace_all(
            map.into_iter()
                .map(|(version, digest)| ImageTag::new(version, digest)),
        );
        storage
    }

    pub fn insert(&self, tag: ImageTag) {
        self.tags.write().insert(tag.version.clone(), tag);
    }

    /// Swap the whole snapshot at once
    pub fn replace_all(&self, tags: impl IntoIterator<Item = ImageTag>) {
        let snapshot: HashMap<_, _> = tags
            .into_iter()
            .map(|tag| (tag.version.clone(), tag))
            .collect();
        *self.tags.write() = snapshot;
    }

    pub fn len(&self) -> usize {
        self.tags.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.read().is_empty()
    }
}

impl ImageTagStorage for InMemoryTagStorage {
    fn get(&self, version: &str) -> Option<ImageTag> {
        self.tags.read().get(version).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_version() {
        let storage = InMemoryTagStorage::new();
        assert!(storage.get("22.1").is_none());
    }

    #[test]
    fn test_aliases_share_digest() {
        let storage = InMemoryTagStorage::from_map(HashMap::from([
            ("latest".to_string(), "sha256:abc".to_string()),
            ("22.1".to_string(), "sha256:abc".to_string()),
        ]));

        assert_eq!(storage.len(), 2);
        assert_eq!(
            storage.get("latest").map(|t| t.digest),
            storage.get("22.1").map(|t| t.digest)
        );
    }

    #[test]
    fn test_replace_all_drops_old_versions() {
        let storage = InMemoryTagStorage::new();
        storage.insert(ImageTag::new("21.8", "sha256:old"));
        storage.replace_all(vec![ImageTag::new("22.1", "sha256:new")]);

        assert!(storage.get("21.8").is_none());
        assert_eq!(storage.get("22.1").unwrap().digest, "sha256:new");
    }
}
