//! Dotted document paths.

use crate::error::{AssignError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A path into a document, such as `"user.name"` or `"items.0.value"`.
///
/// Segments are resolved against the node they land on: a numeric segment
/// indexes a sequence and names a key everywhere else. Paths built with
/// [`DocumentPath::from_segments`] may hold segments containing dots.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DocumentPath(Vec<String>);

impl DocumentPath {
    /// Parse a path from dot notation.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self(Vec::new());
        }
        Self(path.split('.').map(str::to_string).collect())
    }

    /// Create a path from explicit segments.
    ///
    /// A segment containing a dot only stays whole while the path is held as
    /// a value. Written out as a string, as in [`UpdateOperation::to_value`]
    /// or serde, it is split again when read back.
    ///
    /// [`UpdateOperation::to_value`]: crate::UpdateOperation::to_value
    pub fn from_segments<S, I>(segments: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the parent path.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Get the last segment.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Create a child path.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Check the path can address a field: non-empty, no empty segments.
    pub fn validate(&self, operator: &str) -> Result<()> {
        if self.0.is_empty() {
            return Err(AssignError::invalid(operator, self, "empty path"));
        }
        if self.0.iter().any(String::is_empty) {
            return Err(AssignError::invalid(operator, self, "empty path segment"));
        }
        Ok(())
    }

    /// Resolve the path against a document without creating anything.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(document, |node, segment| child_of(node, segment))
    }
}

/// Immutable one-step navigation.
pub(crate) fn child_of<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for DocumentPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for DocumentPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&String> for DocumentPath {
    fn from(path: &String) -> Self {
        Self::parse(path)
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        let path = DocumentPath::parse("users.1.id");
        assert_eq!(path.segments(), &["users", "1", "id"]);
        assert_eq!(path.to_string(), "users.1.id");
        assert_eq!(path.parent(), Some(DocumentPath::parse("users.1")));
        assert_eq!(path.last(), Some("id"));
        assert!(DocumentPath::parse("").is_root());
    }

    #[test]
    fn test_resolve_through_sequences() {
        let doc = Value::from(json!({ "users": [{ "id": "a" }, { "id": "b" }] }));
        let found = DocumentPath::parse("users.1.id").resolve(&doc);
        assert_eq!(found, Some(&Value::from("b")));
        assert_eq!(DocumentPath::parse("users.7.id").resolve(&doc), None);
    }

    #[test]
    fn test_numeric_segment_is_a_key_on_mappings() {
        let doc = Value::from(json!({ "byId": { "1": "one" } }));
        assert_eq!(
            DocumentPath::parse("byId.1").resolve(&doc),
            Some(&Value::from("one"))
        );
    }

    #[test]
    fn test_validate_rejects_empty_segments() {
        assert!(DocumentPath::parse("a..b").validate("$set").is_err());
        assert!(DocumentPath::parse("").validate("$set").is_err());
        assert!(DocumentPath::parse("a.b").validate("$set").is_ok());
    }

    #[test]
    fn test_segments_may_contain_dots() {
        let path = DocumentPath::from_segments(["entities", "user", "a.b"]);
        assert_eq!(path.segments().len(), 3);
    }

    #[test]
    fn test_dotted_segment_splits_when_written_out() {
        let path = DocumentPath::from_segments(["a.b"]);
        let written: String = path.into();
        assert_eq!(DocumentPath::from(written).segments(), ["a", "b"]);
    }
}
