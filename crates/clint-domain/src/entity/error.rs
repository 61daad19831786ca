use thiserror::Error;

use super::kinds::EntityKind;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("no {kind} record found for '{key}'")]
    NotFound { kind: EntityKind, key: String },
    #[error("{matches} {kind} records share {field} '{value}'")]
    NonUniqueIdentifier {
        kind: EntityKind,
        field: &'static str,
        value: String,
        matches: usize,
    },
    #[error("catalog rejected {kind} request with status {status}: {body}")]
    Catalog {
        kind: EntityKind,
        status: u16,
        body: String,
    },
    #[error("{kind}.{field} is read-only")]
    ReadOnlyField { kind: EntityKind, field: String },
    #[error("{kind} has no field '{field}'")]
    UnknownField { kind: EntityKind, field: String },
    #[error("'{value}' is not a valid {kind}.{field} value")]
    InvalidValue {
        kind: EntityKind,
        field: &'static str,
        value: String,
    },
    #[error("{kind}.{field} references {expected} records, not {found}")]
    RelationKind {
        kind: EntityKind,
        field: &'static str,
        expected: EntityKind,
        found: EntityKind,
    },
    #[error("{kind}.{field} is not a relation")]
    NotARelation { kind: EntityKind, field: String },
    #[error("{kind}.{field} is empty")]
    EmptyRelation { kind: EntityKind, field: &'static str },
    #[error("{kind} records cannot be changed once created")]
    ImmutableRecord { kind: EntityKind },
    #[error("catalog accepted the new {kind} record but did not report its location")]
    MissingLocation { kind: EntityKind },
    #[error("could not decode {kind} response: {reason}")]
    Decode { kind: EntityKind, reason: String },
    #[error("catalog request failed")]
    Transport(#[source] anyhow::Error),
}

impl EntityError {
    /// Whether the remote side reported the record as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors the caller can fix by changing its input: unknown ids, bad
    /// field names or values, ambiguous alternate keys.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            Self::Catalog { .. }
                | Self::MissingLocation { .. }
                | Self::Decode { .. }
                | Self::Transport(_)
        )
    }

    /// Stable snake_case tag for machine-readable output.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NonUniqueIdentifier { .. } => "non_unique_identifier",
            Self::Catalog { .. } => "catalog_error",
            Self::ReadOnlyField { .. } => "read_only_field",
            Self::UnknownField { .. } => "unknown_field",
            Self::InvalidValue { .. } => "invalid_value",
            Self::RelationKind { .. } => "relation_kind",
            Self::NotARelation { .. } => "not_a_relation",
            Self::EmptyRelation { .. } => "empty_relation",
            Self::ImmutableRecord { .. } => "immutable_record",
            Self::MissingLocation { .. } => "missing_location",
            Self::Decode { .. } => "decode_error",
            Self::Transport(_) => "catalog_unreachable",
        }
    }

    /// HTTP status carried by the error, when the catalog answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Catalog { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}
