use std::fmt::{self, Write as _};
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::error::EntityError;
use super::kinds::{EntityKind, FieldSpec, Kind, Shape};
use super::value::{FieldValue, PayloadFile, Relation};
use crate::catalog::{identity_from_locator, resource_uri, CatalogResponse, SharedCatalog};

static NULL: FieldValue = FieldValue::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    /// Built locally, never saved or fetched.
    UnloadedNew,
    /// Has a lookup key; fields are fetched on first access.
    UnloadedExisting,
    /// Fields reflect the catalog as of the last fetch or save.
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Primary identity; falls back to the kind's alternate key on not-found.
    Id(String),
    /// Alternate key only (`local_id` for items, `bagname` for bags).
    Alternate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    Created,
    Updated,
}

/// Fields assigned by the catalog. There are no public mutators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOnlyFields {
    id: Option<String>,
    created: Option<String>,
    resource_uri: Option<String>,
    computed: IndexMap<String, Value>,
}

impl ReadOnlyFields {
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    #[must_use]
    pub fn resource_uri(&self) -> Option<&str> {
        self.resource_uri.as_deref()
    }

    #[must_use]
    pub fn computed(&self, name: &str) -> Option<&Value> {
        self.computed.get(name)
    }

    fn render(&self, name: &str) -> String {
        let value = match name {
            "id" => self.id.clone(),
            "created" => self.created.clone(),
            "resource_uri" => self.resource_uri.clone(),
            other => self.computed.get(other).map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        };
        value.unwrap_or_default()
    }
}

/// The untyped state of one catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    kind: EntityKind,
    state: LoadState,
    lookup: Option<Lookup>,
    read_only: ReadOnlyFields,
    values: IndexMap<&'static str, FieldValue>,
    /// A setter changed a value since the last fetch or save.
    modified: bool,
}

impl RecordData {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            state: LoadState::UnloadedNew,
            lookup: None,
            read_only: ReadOnlyFields::default(),
            values: kind
                .table()
                .read_write()
                .map(|spec| (spec.name, FieldValue::Null))
                .collect(),
            modified: false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    #[must_use]
    pub fn read_only(&self) -> &ReadOnlyFields {
        &self.read_only
    }

    /// Raw view of a read-write field; never triggers a fetch.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }
}

/// A lazily loaded catalog record of kind `K`.
///
/// Every accessor runs the load-if-needed guard first: a record built with
/// [`Record::existing`] fetches itself on first use. Read-only fields are
/// only reachable through [`Record::read_only`]; setters reject them before
/// any network traffic.
pub struct Record<K: Kind> {
    data: RecordData,
    catalog: SharedCatalog,
    marker: PhantomData<fn() -> K>,
}

impl<K: Kind> Clone for Record<K> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            catalog: self.catalog.clone(),
            marker: PhantomData,
        }
    }
}

impl<K: Kind> fmt::Debug for Record<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record").field("data", &self.data).finish()
    }
}

impl<K: Kind> Record<K> {
    #[must_use]
    pub fn new(catalog: SharedCatalog) -> Self {
        Self::from_data(catalog, RecordData::new(K::KIND))
    }

    pub fn existing(catalog: SharedCatalog, id: impl Into<String>) -> Self {
        Self::lookup(catalog, Lookup::Id(id.into()))
    }

    #[must_use]
    pub fn lookup(catalog: SharedCatalog, lookup: Lookup) -> Self {
        let mut data = RecordData::new(K::KIND);
        data.state = LoadState::UnloadedExisting;
        data.lookup = Some(lookup);
        Self::from_data(catalog, data)
    }

    pub fn load(catalog: SharedCatalog, id: impl Into<String>) -> Result<Self, EntityError> {
        Self::load_by(catalog, Lookup::Id(id.into()))
    }

    pub fn load_by(catalog: SharedCatalog, lookup: Lookup) -> Result<Self, EntityError> {
        let mut record = Self::lookup(catalog, lookup);
        record.ensure_loaded()?;
        Ok(record)
    }

    fn from_data(catalog: SharedCatalog, data: RecordData) -> Self {
        debug_assert_eq!(data.kind, K::KIND);
        Self {
            data,
            catalog,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        K::KIND
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.data.state
    }

    /// Identity as currently known, without fetching.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.data.read_only.id()
    }

    #[must_use]
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> RecordData {
        self.data
    }

    /// Whether [`Record::save`] has anything to send: the record was never
    /// saved, or a setter changed one of its values.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.data.state == LoadState::UnloadedNew || self.data.modified
    }

    pub fn ensure_loaded(&mut self) -> Result<(), EntityError> {
        if self.data.state == LoadState::UnloadedExisting {
            self.fetch()?;
        }
        Ok(())
    }

    pub fn read_only(&mut self) -> Result<&ReadOnlyFields, EntityError> {
        self.ensure_loaded()?;
        Ok(&self.data.read_only)
    }

    /// Value of a read-write field. Read-only fields live in [`Record::read_only`].
    pub fn get(&mut self, name: &str) -> Result<&FieldValue, EntityError> {
        let spec = self.spec(name)?;
        if spec.is_read_only() {
            return Err(EntityError::UnknownField {
                kind: K::KIND,
                field: format!("{name} (read-only; use read_only())"),
            });
        }
        self.ensure_loaded()?;
        Ok(self.data.values.get(spec.name).unwrap_or(&NULL))
    }

    pub fn text(&mut self, name: &str) -> Result<Option<String>, EntityError> {
        Ok(self.get(name)?.as_text().map(ToOwned::to_owned))
    }

    /// Label for an enumerated field's stored code.
    pub fn label(&mut self, name: &str) -> Result<Option<&'static str>, EntityError> {
        let spec = self.spec(name)?;
        let Shape::Options(table) = spec.shape else {
            return Err(self.invalid(spec, name));
        };
        Ok(self.get(name)?.as_text().and_then(|code| table.label(code)))
    }

    pub fn relation(&mut self, name: &str) -> Result<Option<&Relation>, EntityError> {
        Ok(self.get(name)?.as_relation())
    }

    pub fn relation_id(&mut self, name: &str) -> Result<Option<String>, EntityError> {
        Ok(self
            .relation(name)?
            .and_then(Relation::id)
            .map(ToOwned::to_owned))
    }

    pub fn payload(&mut self, name: &str) -> Result<Vec<PayloadFile>, EntityError> {
        Ok(self.get(name)?.as_payload().map(<[PayloadFile]>::to_vec).unwrap_or_default())
    }

    /// Sets a field from operator input: plain text, an option label or
    /// code, a related record's identity or locator, or payload lines.
    /// An empty string clears the field.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), EntityError> {
        let spec = self.writable(name)?;
        let value = if raw.is_empty() {
            FieldValue::Null
        } else {
            match spec.shape {
                Shape::Text => FieldValue::Text(raw.to_string()),
                Shape::Options(table) => FieldValue::Code(
                    table
                        .code(raw)
                        .ok_or_else(|| self.invalid(spec, raw))?
                        .to_string(),
                ),
                Shape::Relation(target) => {
                    let id = identity_from_locator(self.catalog.api_root(), target, raw)
                        .unwrap_or_else(|| raw.to_string());
                    FieldValue::Relation(Relation::to(target, id))
                }
                Shape::Payload => FieldValue::Payload(
                    PayloadFile::parse_all(raw).ok_or_else(|| self.invalid(spec, raw))?,
                ),
            }
        };
        self.put(spec.name, value);
        Ok(())
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> Result<(), EntityError> {
        let spec = self.writable(name)?;
        let value = value.into();
        if !matches!(spec.shape, Shape::Text) {
            return Err(self.invalid(spec, &value));
        }
        self.put(spec.name, FieldValue::Text(value));
        Ok(())
    }

    pub fn set_option(&mut self, name: &str, label_or_code: &str) -> Result<(), EntityError> {
        let spec = self.writable(name)?;
        let Shape::Options(table) = spec.shape else {
            return Err(self.invalid(spec, label_or_code));
        };
        let code = table
            .code(label_or_code)
            .ok_or_else(|| self.invalid(spec, label_or_code))?;
        self.put(spec.name, FieldValue::Code(code.to_string()));
        Ok(())
    }

    pub fn set_relation(&mut self, name: &str, relation: Relation) -> Result<(), EntityError> {
        let spec = self.writable(name)?;
        let Shape::Relation(target) = spec.shape else {
            return Err(EntityError::NotARelation {
                kind: K::KIND,
                field: name.to_string(),
            });
        };
        if relation.kind() != target {
            return Err(EntityError::RelationKind {
                kind: K::KIND,
                field: spec.name,
                expected: target,
                found: relation.kind(),
            });
        }
        self.put(spec.name, FieldValue::Relation(relation));
        Ok(())
    }

    pub fn set_payload(&mut self, name: &str, files: Vec<PayloadFile>) -> Result<(), EntityError> {
        let spec = self.writable(name)?;
        if !matches!(spec.shape, Shape::Payload) {
            return Err(self.invalid(spec, "payload"));
        }
        self.put(spec.name, FieldValue::Payload(files));
        Ok(())
    }

    /// Fetches the record a relation field points at and caches it in the
    /// field. Already-resolved relations are returned without a request.
    pub fn resolve<R: Kind>(&mut self, name: &str) -> Result<Record<R>, EntityError> {
        let spec = self.spec(name)?;
        let Shape::Relation(target) = spec.shape else {
            return Err(EntityError::NotARelation {
                kind: K::KIND,
                field: name.to_string(),
            });
        };
        if target != R::KIND {
            return Err(EntityError::RelationKind {
                kind: K::KIND,
                field: spec.name,
                expected: target,
                found: R::KIND,
            });
        }
        self.ensure_loaded()?;
        let relation = match self.data.values.get(spec.name) {
            Some(FieldValue::Relation(relation)) => relation.clone(),
            _ => {
                return Err(EntityError::EmptyRelation {
                    kind: K::KIND,
                    field: spec.name,
                })
            }
        };
        match relation {
            Relation::Resolved(data) => Ok(Record::from_data(self.catalog.clone(), *data)),
            Relation::Unresolved { id, .. } => {
                let related = Record::<R>::load(self.catalog.clone(), id)?;
                self.data.values.insert(
                    spec.name,
                    FieldValue::Relation(Relation::Resolved(Box::new(related.data.clone()))),
                );
                Ok(related)
            }
        }
    }

    /// Creates the record when it has never been saved or fetched, otherwise
    /// replaces the full remote field set.
    pub fn save(&mut self) -> Result<SaveKind, EntityError> {
        if self.data.state == LoadState::UnloadedNew {
            return self.create();
        }
        if K::KIND.table().immutable {
            return Err(EntityError::ImmutableRecord { kind: K::KIND });
        }
        self.ensure_loaded()?;
        self.update()
    }

    /// Wire body: every read-write field, relations as resource locators.
    #[must_use]
    pub fn to_wire(&self) -> Map<String, Value> {
        let api_root = self.catalog.api_root();
        K::KIND
            .table()
            .read_write()
            .map(|spec| {
                let value = match self.data.values.get(spec.name).unwrap_or(&NULL) {
                    FieldValue::Null => Value::Null,
                    FieldValue::Text(text) | FieldValue::Code(text) => Value::String(text.clone()),
                    FieldValue::Relation(relation) => relation.id().map_or(Value::Null, |id| {
                        Value::String(resource_uri(api_root, relation.kind(), id))
                    }),
                    FieldValue::Payload(files) => Value::String(PayloadFile::render_all(files)),
                };
                (spec.name.to_string(), value)
            })
            .collect()
    }

    /// Operator-facing rendering; enumerated codes print as labels.
    pub fn to_display_string(&mut self) -> Result<String, EntityError> {
        self.ensure_loaded()?;
        let kind = K::KIND;
        let mut out = format!(
            "{} {}",
            kind.title(),
            self.data.read_only.id().unwrap_or("(unsaved)")
        );
        for spec in kind.table().fields {
            let rendered = if spec.is_read_only() {
                self.data.read_only.render(spec.name)
            } else {
                render_value(spec, self.data.values.get(spec.name).unwrap_or(&NULL))
            };
            let _ = write!(out, "\n    {}: {}", spec.name, rendered);
        }
        Ok(out)
    }

    fn spec(&self, name: &str) -> Result<&'static FieldSpec, EntityError> {
        K::KIND
            .table()
            .spec(name)
            .ok_or_else(|| EntityError::UnknownField {
                kind: K::KIND,
                field: name.to_string(),
            })
    }

    fn writable(&mut self, name: &str) -> Result<&'static FieldSpec, EntityError> {
        let spec = self.spec(name)?;
        if spec.is_read_only() {
            return Err(EntityError::ReadOnlyField {
                kind: K::KIND,
                field: name.to_string(),
            });
        }
        self.ensure_loaded()?;
        Ok(spec)
    }

    fn put(&mut self, name: &'static str, value: FieldValue) {
        if self.data.values.get(name) != Some(&value) {
            self.data.values.insert(name, value);
            self.data.modified = true;
        }
    }

    fn invalid(&self, spec: &'static FieldSpec, value: &str) -> EntityError {
        EntityError::InvalidValue {
            kind: K::KIND,
            field: spec.name,
            value: value.to_string(),
        }
    }

    fn create(&mut self) -> Result<SaveKind, EntityError> {
        let kind = K::KIND;
        let response = self
            .catalog
            .post(kind, &self.to_wire())
            .map_err(EntityError::Transport)?;
        debug!(%kind, status = response.status, "catalog create");
        check(kind, &response, "(new)")?;

        let api_root = self.catalog.api_root().to_string();
        let id = response
            .location
            .as_deref()
            .and_then(|location| identity_from_locator(&api_root, kind, location))
            .or_else(|| {
                response
                    .json()
                    .ok()
                    .and_then(|body| body_identity(&api_root, kind, &body))
            })
            .ok_or(EntityError::MissingLocation { kind })?;

        self.data.read_only.resource_uri = Some(resource_uri(&api_root, kind, &id));
        self.data.read_only.id = Some(id.clone());
        self.data.lookup = Some(Lookup::Id(id));
        self.data.state = LoadState::Loaded;
        self.data.modified = false;
        Ok(SaveKind::Created)
    }

    fn update(&mut self) -> Result<SaveKind, EntityError> {
        let kind = K::KIND;
        let id = self
            .data
            .read_only
            .id
            .clone()
            .ok_or_else(|| decode(kind, "loaded record has no identity"))?;
        let response = self
            .catalog
            .put(kind, &id, &self.to_wire())
            .map_err(EntityError::Transport)?;
        debug!(%kind, %id, status = response.status, "catalog update");
        check(kind, &response, &id)?;
        self.data.state = LoadState::Loaded;
        self.data.modified = false;
        Ok(SaveKind::Updated)
    }

    fn fetch(&mut self) -> Result<(), EntityError> {
        let kind = K::KIND;
        match self.data.lookup.clone() {
            None => Ok(()),
            Some(Lookup::Id(id)) => {
                let response = self
                    .catalog
                    .get(kind, &id)
                    .map_err(EntityError::Transport)?;
                debug!(%kind, %id, status = response.status, "catalog fetch");
                if response.is_not_found() {
                    return match kind.table().alternate_key {
                        Some(field) => {
                            debug!(%kind, %id, field, "retrying fetch by alternate key");
                            self.fetch_alternate(field, &id)
                        }
                        None => Err(EntityError::NotFound { kind, key: id }),
                    };
                }
                check(kind, &response, &id)?;
                let body = response
                    .json()
                    .map_err(|err| decode(kind, err.to_string()))?;
                self.populate(&body)
            }
            Some(Lookup::Alternate(value)) => {
                let field = kind
                    .table()
                    .alternate_key
                    .ok_or_else(|| EntityError::UnknownField {
                        kind,
                        field: "alternate key".to_string(),
                    })?;
                self.fetch_alternate(field, &value)
            }
        }
    }

    fn fetch_alternate(&mut self, field: &'static str, value: &str) -> Result<(), EntityError> {
        let kind = K::KIND;
        let response = self
            .catalog
            .query(kind, &[(field, value)])
            .map_err(EntityError::Transport)?;
        debug!(%kind, field, value, status = response.status, "catalog query");
        check(kind, &response, value)?;
        let body = response
            .json()
            .map_err(|err| decode(kind, err.to_string()))?;
        let objects = body
            .get("objects")
            .and_then(Value::as_array)
            .or_else(|| body.as_array())
            .ok_or_else(|| decode(kind, "query response has no objects"))?;
        match objects.as_slice() {
            [] => Err(EntityError::NotFound {
                kind,
                key: value.to_string(),
            }),
            [only] => self.populate(only),
            many => Err(EntityError::NonUniqueIdentifier {
                kind,
                field,
                value: value.to_string(),
                matches: many.len(),
            }),
        }
    }

    fn populate(&mut self, body: &Value) -> Result<(), EntityError> {
        let kind = K::KIND;
        let object = body
            .as_object()
            .ok_or_else(|| decode(kind, "expected a JSON object"))?;
        let api_root = self.catalog.api_root().to_string();

        let mut read_only = ReadOnlyFields::default();
        let mut values = IndexMap::new();
        for spec in kind.table().fields {
            let raw = object.get(spec.name).unwrap_or(&Value::Null);
            if spec.is_read_only() {
                match spec.name {
                    "id" => read_only.id = scalar(raw),
                    "created" => read_only.created = scalar(raw),
                    "resource_uri" => read_only.resource_uri = scalar(raw),
                    other if !raw.is_null() => {
                        read_only.computed.insert(other.to_string(), raw.clone());
                    }
                    _ => {}
                }
                continue;
            }
            values.insert(spec.name, decode_value(kind, spec, raw, &api_root)?);
        }

        if read_only.id.is_none() {
            read_only.id = read_only
                .resource_uri
                .as_deref()
                .and_then(|uri| identity_from_locator(&api_root, kind, uri));
        }
        let id = read_only
            .id
            .clone()
            .ok_or_else(|| decode(kind, "record has no identity"))?;
        if read_only.resource_uri.is_none() {
            read_only.resource_uri = Some(resource_uri(&api_root, kind, &id));
        }

        self.data.read_only = read_only;
        self.data.values = values;
        self.data.lookup = Some(Lookup::Id(id));
        self.data.state = LoadState::Loaded;
        self.data.modified = false;
        Ok(())
    }
}

fn check(kind: EntityKind, response: &CatalogResponse, key: &str) -> Result<(), EntityError> {
    if response.is_success() {
        Ok(())
    } else if response.is_not_found() {
        Err(EntityError::NotFound {
            kind,
            key: key.to_string(),
        })
    } else {
        Err(EntityError::Catalog {
            kind,
            status: response.status,
            body: response.body.clone(),
        })
    }
}

fn decode(kind: EntityKind, reason: impl Into<String>) -> EntityError {
    EntityError::Decode {
        kind,
        reason: reason.into(),
    }
}

fn scalar(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn body_identity(api_root: &str, kind: EntityKind, body: &Value) -> Option<String> {
    body.get("id").and_then(scalar).or_else(|| {
        body.get("resource_uri")
            .and_then(Value::as_str)
            .and_then(|uri| identity_from_locator(api_root, kind, uri))
    })
}

fn decode_value(
    kind: EntityKind,
    spec: &'static FieldSpec,
    raw: &Value,
    api_root: &str,
) -> Result<FieldValue, EntityError> {
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }
    let unexpected = || decode(kind, format!("unexpected value for {}: {raw}", spec.name));
    match spec.shape {
        Shape::Text => scalar(raw).map(FieldValue::Text).ok_or_else(unexpected),
        Shape::Options(table) => {
            let code = scalar(raw).ok_or_else(unexpected)?;
            if table.label(&code).is_none() {
                return Err(EntityError::InvalidValue {
                    kind,
                    field: spec.name,
                    value: code,
                });
            }
            Ok(FieldValue::Code(code))
        }
        Shape::Relation(target) => {
            let locator = match raw {
                Value::Object(nested) => nested
                    .get("resource_uri")
                    .or_else(|| nested.get("id"))
                    .and_then(scalar),
                other => scalar(other),
            }
            .ok_or_else(unexpected)?;
            let id = identity_from_locator(api_root, target, &locator).unwrap_or(locator);
            Ok(FieldValue::Relation(Relation::to(target, id)))
        }
        Shape::Payload => match raw {
            Value::String(text) => PayloadFile::parse_all(text)
                .map(FieldValue::Payload)
                .ok_or_else(unexpected),
            Value::Array(_) => serde_json::from_value::<Vec<PayloadFile>>(raw.clone())
                .map(FieldValue::Payload)
                .map_err(|_| unexpected()),
            _ => Err(unexpected()),
        },
    }
}

fn render_value(spec: &FieldSpec, value: &FieldValue) -> String {
    match (value, spec.shape) {
        (FieldValue::Null, _) => String::new(),
        (FieldValue::Code(code), Shape::Options(table)) => {
            table.label(code).unwrap_or(code.as_str()).to_string()
        }
        (FieldValue::Text(text) | FieldValue::Code(text), _) => text.clone(),
        (FieldValue::Relation(relation), _) => relation.id().unwrap_or_default().to_string(),
        (FieldValue::Payload(files), _) => {
            let total: u64 = files.iter().map(|file| file.bytes).sum();
            let mut rendered = format!("{} files ({total} bytes)", files.len());
            for file in files {
                let _ = write!(rendered, "\n        {file}");
            }
            rendered
        }
    }
}
