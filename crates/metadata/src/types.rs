use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vitaledge_common::{Result, VectorDbError, VectorId};

/// Set of tag labels
///
/// Labels are trimmed; blank labels are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl AsRef<str>) -> bool {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            return false;
        }
        self.0.insert(tag.to_string())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Self::new();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(tags: TagSet) -> Self {
        tags.0.into_iter().collect()
    }
}

/// Descriptive attributes supplied with a vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Free text (required, non-empty)
    pub text: String,

    /// Caller-side identifier, unique when present
    #[serde(default)]
    pub external_id: Option<String>,

    /// Category label
    #[serde(default)]
    pub category: Option<String>,

    /// Tags
    #[serde(default)]
    pub tags: TagSet,
}

impl RecordMetadata {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(VectorDbError::invalid_input("text cannot be empty"));
        }

        if matches!(&self.external_id, Some(ext) if ext.trim().is_empty()) {
            return Err(VectorDbError::invalid_input("external_id cannot be blank"));
        }

        Ok(())
    }
}

/// Stored metadata for one vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Same id as the vector in the index
    pub id: VectorId,

    pub text: String,

    pub external_id: Option<String>,

    pub category: Option<String>,

    pub tags: TagSet,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Descriptive attributes without the storage bookkeeping
    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            text: self.text.clone(),
            external_id: self.external_id.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_set_normalizes() {
        let tags: TagSet = ["  rust ", "", "db", "rust"].into_iter().collect();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("rust"));
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["db", "rust"]);
    }

    #[test]
    fn test_tag_set_serializes_as_list() {
        let tags: TagSet = ["b", "a"].into_iter().collect();
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["a","b"]"#);

        let parsed: TagSet = serde_json::from_str(r#"["x", " ", "x"]"#).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(RecordMetadata::new("hello").validate().is_ok());
        assert!(matches!(
            RecordMetadata::new("   ").validate(),
            Err(VectorDbError::InvalidInput(_))
        ));
        assert!(RecordMetadata::new("hello")
            .with_external_id(" ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_metadata_deserializes_with_defaults() {
        let meta: RecordMetadata = serde_json::from_str(r#"{"text": "a"}"#).unwrap();
        assert_eq!(meta, RecordMetadata::new("a"));
    }
}
