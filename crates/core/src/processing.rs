use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied label describing where a single image came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessingType {
    Camera,
    DocumentScan,
    GallerySingle,
    Other(String),
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingType::Camera => write!(f, "camera"),
            ProcessingType::DocumentScan => write!(f, "document-scan"),
            ProcessingType::GallerySingle => write!(f, "gallery-single"),
            ProcessingType::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ProcessingType {
    fn from(s: &str) -> Self {
        match s {
            "camera" => ProcessingType::Camera,
            "document-scan" => ProcessingType::DocumentScan,
            "gallery-single" => ProcessingType::GallerySingle,
            other => ProcessingType::Other(other.to_string()),
        }
    }
}

impl From<String> for ProcessingType {
    fn from(s: String) -> Self {
        ProcessingType::from(s.as_str())
    }
}

impl From<ProcessingType> for String {
    fn from(t: ProcessingType) -> Self {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_roundtrip() {
        for t in [
            ProcessingType::Camera,
            ProcessingType::DocumentScan,
            ProcessingType::GallerySingle,
        ] {
            assert_eq!(ProcessingType::from(t.to_string()), t);
        }
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let t = ProcessingType::from("share-sheet");
        assert_eq!(t, ProcessingType::Other("share-sheet".into()));
        assert_eq!(t.to_string(), "share-sheet");
    }
}
