//! Typed records over the remote catalog.
//!
//! Each kind has a static field table declaring which fields are read-only,
//! which are relations and which take values from a closed option table.
//! [`Record`] is generic over a kind marker so a `Record<Bag>` can never be
//! handed to code expecting a `Record<Item>`.

mod error;
mod kinds;
mod record;
mod typed;
mod value;

pub use error::EntityError;
pub use kinds::{
    Access, Bag, BagAction, Collection, EntityKind, FieldSpec, FieldTable, Item, Kind, Machine,
    OptionTable, Project, Shape, BAG_ACTIONS, BAG_TYPES, ITEM_TYPES,
};
pub use record::{LoadState, Lookup, ReadOnlyFields, Record, RecordData, SaveKind};
pub use value::{FieldValue, PayloadFile, Relation};

/// Runs `$body` with `$marker` bound to the kind marker type for a runtime
/// [`EntityKind`].
#[macro_export]
macro_rules! with_kind {
    ($kind:expr, $marker:ident => $body:expr) => {
        match $kind {
            $crate::EntityKind::Machine => {
                type $marker = $crate::Machine;
                $body
            }
            $crate::EntityKind::Collection => {
                type $marker = $crate::Collection;
                $body
            }
            $crate::EntityKind::Project => {
                type $marker = $crate::Project;
                $body
            }
            $crate::EntityKind::Item => {
                type $marker = $crate::Item;
                $body
            }
            $crate::EntityKind::Bag => {
                type $marker = $crate::Bag;
                $body
            }
            $crate::EntityKind::BagAction => {
                type $marker = $crate::BagAction;
                $body
            }
        }
    };
}
