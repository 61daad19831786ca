#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod catalog;
pub mod entity;
pub mod units;

pub use catalog::{Catalog, CatalogResponse, MemoryCatalog, RequestMethod, SharedCatalog};
pub use entity::{
    Access, Bag, BagAction, Collection, EntityError, EntityKind, FieldSpec, FieldTable,
    FieldValue, Item, Kind, LoadState, Lookup, Machine, OptionTable, PayloadFile, Project,
    ReadOnlyFields, Record, RecordData, Relation, SaveKind, Shape, BAG_ACTIONS, BAG_TYPES,
    ITEM_TYPES,
};
pub use units::{parse_bytes, parse_percent, UnitError};
