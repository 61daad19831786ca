use std::fmt::Write as _;

use anyhow::Result;
use clint_domain::{with_kind, EntityError, EntityKind, Kind, Record, SharedCatalog};
use serde_json::{json, Map, Value};

use crate::core::config::CommandContext;
use crate::core::tooling::ExecutionOutcome;

#[derive(Clone, Debug)]
pub struct ShowRequest {
    pub kind: EntityKind,
    pub id: String,
    /// Also fetch and render every related record.
    pub expand: bool,
}

#[derive(Clone, Debug)]
pub struct AddRequest {
    pub kind: EntityKind,
    pub fields: Vec<(String, String)>,
}

#[derive(Clone, Debug)]
pub struct EditRequest {
    pub kind: EntityKind,
    pub id: String,
    pub fields: Vec<(String, String)>,
}

struct Shown {
    id: Option<String>,
    text: String,
    fields: Map<String, Value>,
    expanded: Map<String, Value>,
}

pub fn entity_show(ctx: &CommandContext, request: &ShowRequest) -> Result<ExecutionOutcome> {
    let catalog = ctx.catalog()?;
    let kind = request.kind;
    let shown = with_kind!(kind, K => show_record::<K>(catalog, &request.id, request.expand));
    Ok(match shown {
        Ok(shown) => ExecutionOutcome::success(
            shown.text,
            json!({
                "kind": kind,
                "id": shown.id,
                "fields": shown.fields,
                "expanded": shown.expanded,
                "passthrough": true,
            }),
        ),
        Err(err) => ExecutionOutcome::from_error(&err, json!({ "kind": kind, "id": request.id })),
    })
}

pub fn entity_add(ctx: &CommandContext, request: &AddRequest) -> Result<ExecutionOutcome> {
    if request.fields.is_empty() {
        return Ok(no_fields(request.kind, None));
    }
    let catalog = ctx.catalog()?;
    let kind = request.kind;
    let created = with_kind!(kind, K => {
        let mut record = Record::<K>::new(catalog);
        apply_fields(&mut record, &request.fields)
            .and_then(|()| record.save())
            .map(|_| record.id().map(str::to_string))
    });
    Ok(match created {
        Ok(id) => ExecutionOutcome::success(
            format!("created {} {}", kind, id.as_deref().unwrap_or("(unknown)")),
            json!({ "kind": kind, "id": id, "fields": field_names(&request.fields) }),
        ),
        Err(err) => ExecutionOutcome::from_error(&err, json!({ "kind": kind })),
    })
}

/// Loads the record, applies the changes and writes back the full field
/// set.
pub fn entity_edit(ctx: &CommandContext, request: &EditRequest) -> Result<ExecutionOutcome> {
    if request.fields.is_empty() {
        return Ok(no_fields(request.kind, Some(&request.id)));
    }
    let catalog = ctx.catalog()?;
    let kind = request.kind;
    let updated = with_kind!(kind, K => {
        Record::<K>::load(catalog, request.id.as_str()).and_then(|mut record| {
            apply_fields(&mut record, &request.fields)?;
            record.save()?;
            Ok(record.id().map(str::to_string))
        })
    });
    Ok(match updated {
        Ok(id) => ExecutionOutcome::success(
            format!("updated {} {}", kind, id.as_deref().unwrap_or(&request.id)),
            json!({ "kind": kind, "id": id, "fields": field_names(&request.fields) }),
        ),
        Err(err) => ExecutionOutcome::from_error(&err, json!({ "kind": kind, "id": request.id })),
    })
}

fn show_record<K: Kind>(
    catalog: SharedCatalog,
    id: &str,
    expand: bool,
) -> Result<Shown, EntityError> {
    let mut record = Record::<K>::load(catalog, id)?;
    let mut text = record.to_display_string()?;
    let mut expanded = Map::new();
    if expand {
        for (field, target) in K::KIND.table().relations() {
            if record.relation(field)?.is_none() {
                continue;
            }
            let related =
                with_kind!(target, R => record.resolve::<R>(field)?.to_display_string()?);
            let _ = write!(text, "\n\n{field} -> {related}");
            expanded.insert(field.to_string(), Value::String(related));
        }
    }
    Ok(Shown {
        id: record.id().map(str::to_string),
        text,
        fields: record.to_wire(),
        expanded,
    })
}

fn apply_fields<K: Kind>(
    record: &mut Record<K>,
    fields: &[(String, String)],
) -> Result<(), EntityError> {
    for (name, value) in fields {
        record.set(name, value)?;
    }
    Ok(())
}

fn field_names(fields: &[(String, String)]) -> Vec<&str> {
    fields.iter().map(|(name, _)| name.as_str()).collect()
}

fn no_fields(kind: EntityKind, id: Option<&str>) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        "no fields to set",
        json!({
            "reason": "no_fields",
            "kind": kind,
            "id": id,
            "hint": "Pass one or more --set field=value pairs.",
        }),
    )
}
