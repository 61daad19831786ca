use std::fmt;

use serde::{Deserialize, Serialize};

use super::kinds::EntityKind;
use super::record::RecordData;

/// One payload file as summarized on a bag record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFile {
    pub name: String,
    pub bytes: u64,
}

impl PayloadFile {
    pub fn new(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Wire form: one `name size` line per file.
    #[must_use]
    pub fn render_all(files: &[PayloadFile]) -> String {
        files
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses the wire form; the size is the last whitespace-separated token
    /// so names may contain spaces. Returns `None` on a malformed line.
    #[must_use]
    pub fn parse_all(raw: &str) -> Option<Vec<PayloadFile>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (name, size) = line.rsplit_once(char::is_whitespace)?;
                let bytes = size.parse().ok()?;
                Some(PayloadFile::new(name.trim_end(), bytes))
            })
            .collect()
    }
}

impl fmt::Display for PayloadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.bytes)
    }
}

/// A reference to another catalog record.
///
/// Assigning an identifier never touches the network; resolution is an
/// explicit call on the owning `Record`.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Unresolved { kind: EntityKind, id: String },
    Resolved(Box<RecordData>),
}

impl Relation {
    pub fn to(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::Unresolved {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Unresolved { kind, .. } => *kind,
            Self::Resolved(data) => data.kind(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Unresolved { id, .. } => Some(id),
            Self::Resolved(data) => data.read_only().id(),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// A read-write field value. Enumerated fields hold their compact code.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Code(String),
    Relation(Relation),
    Payload(Vec<PayloadFile>),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) | Self::Code(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Self::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_payload(&self) -> Option<&[PayloadFile]> {
        match self {
            Self::Payload(files) => Some(files),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_lines_keep_names_with_spaces() {
        let files = vec![
            PayloadFile::new("data/a.txt", 12),
            PayloadFile::new("data/scan 01.tif", 4096),
        ];
        let wire = PayloadFile::render_all(&files);
        assert_eq!(wire, "data/a.txt 12\ndata/scan 01.tif 4096");
        assert_eq!(PayloadFile::parse_all(&wire), Some(files));
    }

    #[test]
    fn malformed_payload_lines_are_rejected() {
        assert_eq!(PayloadFile::parse_all("data/a.txt twelve"), None);
        assert_eq!(PayloadFile::parse_all("data/a.txt"), None);
        assert_eq!(PayloadFile::parse_all(""), Some(Vec::new()));
    }
}
