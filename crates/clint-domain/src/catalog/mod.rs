//! The remote catalog as seen by the entity model.
//!
//! Implementations speak whatever transport they like; records only see
//! status codes, an optional location, and a body.

mod locator;
mod memory;

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::entity::EntityKind;

pub use locator::{api_root, collection_uri, identity_from_locator, resource_uri};
pub use memory::{MemoryCatalog, RecordedRequest, RequestMethod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl CatalogResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Parses the body as JSON; an empty body reads as `null`.
    pub fn json(&self) -> serde_json::Result<Value> {
        if self.body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&self.body)
        }
    }
}

pub trait Catalog: Send + Sync {
    /// Path prefix shared by every resource, e.g. `/api/v1/`.
    fn api_root(&self) -> &str;

    fn get(&self, kind: EntityKind, id: &str) -> Result<CatalogResponse>;

    /// Lists records whose fields equal every `(field, value)` filter.
    fn query(&self, kind: EntityKind, filters: &[(&str, &str)]) -> Result<CatalogResponse>;

    fn post(&self, kind: EntityKind, fields: &Map<String, Value>) -> Result<CatalogResponse>;

    /// Replaces the full field set of an existing record.
    fn put(&self, kind: EntityKind, id: &str, fields: &Map<String, Value>)
        -> Result<CatalogResponse>;
}

pub type SharedCatalog = Arc<dyn Catalog>;
