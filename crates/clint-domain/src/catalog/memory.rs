use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use super::{api_root, resource_uri, Catalog, CatalogResponse};
use crate::entity::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Query,
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: RequestMethod,
    pub kind: EntityKind,
    pub key: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<EntityKind, IndexMap<String, Map<String, Value>>>,
    counters: HashMap<EntityKind, u64>,
    requests: Vec<RecordedRequest>,
    failures: HashMap<(RequestMethod, EntityKind), u16>,
    offline: bool,
}

/// A catalog held entirely in memory.
///
/// New identities are the kind's initial plus a per-kind counter (`I1`,
/// `B1`, `A1`, ...). Every request is recorded so callers can assert on the
/// exact sequence of creates and updates.
pub struct MemoryCatalog {
    api_root: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_root: api_root("/", "v1"),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seeds a row as if it had been created remotely.
    pub fn insert(&self, kind: EntityKind, id: &str, fields: Value) {
        let mut row = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        row.insert("id".into(), Value::String(id.to_string()));
        row.insert(
            "resource_uri".into(),
            Value::String(resource_uri(&self.api_root, kind, id)),
        );
        self.state()
            .rows
            .entry(kind)
            .or_default()
            .insert(id.to_string(), row);
    }

    /// Makes every later `method` request for `kind` answer with `status`.
    pub fn fail(&self, method: RequestMethod, kind: EntityKind, status: u16) {
        self.state().failures.insert((method, kind), status);
    }

    /// Makes every request fail at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    #[must_use]
    pub fn row(&self, kind: EntityKind, id: &str) -> Option<Map<String, Value>> {
        self.state()
            .rows
            .get(&kind)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    #[must_use]
    pub fn rows(&self, kind: EntityKind) -> Vec<Map<String, Value>> {
        self.state()
            .rows
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state().rows.get(&kind).map_or(0, IndexMap::len)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    #[must_use]
    pub fn count_requests(&self, method: RequestMethod, kind: EntityKind) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|request| request.method == method && request.kind == kind)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    fn begin(
        &self,
        method: RequestMethod,
        kind: EntityKind,
        key: Option<&str>,
    ) -> Result<Option<CatalogResponse>> {
        let mut state = self.state();
        if state.offline {
            return Err(anyhow!("memory catalog is offline"));
        }
        state.requests.push(RecordedRequest {
            method,
            kind,
            key: key.map(ToOwned::to_owned),
        });
        Ok(state
            .failures
            .get(&(method, kind))
            .map(|status| CatalogResponse::new(*status, "injected failure")))
    }
}

fn initial(kind: EntityKind) -> char {
    match kind {
        EntityKind::Machine => 'M',
        EntityKind::Collection => 'C',
        EntityKind::Project => 'P',
        EntityKind::Item => 'I',
        EntityKind::Bag => 'B',
        EntityKind::BagAction => 'A',
    }
}

fn matches_filter(row: &Map<String, Value>, field: &str, expected: &str) -> bool {
    match row.get(field) {
        Some(Value::String(value)) => value == expected,
        Some(Value::Number(value)) => value.to_string() == expected,
        _ => false,
    }
}

impl Catalog for MemoryCatalog {
    fn api_root(&self) -> &str {
        &self.api_root
    }

    fn get(&self, kind: EntityKind, id: &str) -> Result<CatalogResponse> {
        if let Some(failure) = self.begin(RequestMethod::Get, kind, Some(id))? {
            return Ok(failure);
        }
        Ok(match self.row(kind, id) {
            Some(row) => CatalogResponse::new(200, Value::Object(row).to_string()),
            None => CatalogResponse::new(404, ""),
        })
    }

    fn query(&self, kind: EntityKind, filters: &[(&str, &str)]) -> Result<CatalogResponse> {
        if let Some(failure) = self.begin(RequestMethod::Query, kind, None)? {
            return Ok(failure);
        }
        let objects: Vec<Value> = self
            .rows(kind)
            .into_iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|(field, value)| matches_filter(row, field, value))
            })
            .map(Value::Object)
            .collect();
        let body = json!({
            "meta": { "total_count": objects.len() },
            "objects": objects,
        });
        Ok(CatalogResponse::new(200, body.to_string()))
    }

    fn post(&self, kind: EntityKind, fields: &Map<String, Value>) -> Result<CatalogResponse> {
        if let Some(failure) = self.begin(RequestMethod::Post, kind, None)? {
            return Ok(failure);
        }
        let id = {
            let mut state = self.state();
            let counter = state.counters.entry(kind).or_insert(0);
            *counter += 1;
            format!("{}{}", initial(kind), counter)
        };
        self.insert(kind, &id, Value::Object(fields.clone()));
        let location = format!("http://catalog.invalid{}", resource_uri(&self.api_root, kind, &id));
        Ok(CatalogResponse::new(201, "").with_location(location))
    }

    fn put(
        &self,
        kind: EntityKind,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<CatalogResponse> {
        if let Some(failure) = self.begin(RequestMethod::Put, kind, Some(id))? {
            return Ok(failure);
        }
        let Some(existing) = self.row(kind, id) else {
            return Ok(CatalogResponse::new(404, ""));
        };
        let mut replacement = fields.clone();
        if let Some(created) = existing.get("created") {
            replacement.insert("created".into(), created.clone());
        }
        self.insert(kind, id, Value::Object(replacement));
        Ok(CatalogResponse::new(204, ""))
    }
}
