//! Command handlers. Each takes a [`CommandContext`](crate::CommandContext)
//! and a request, and returns the outcome the CLI renders. Operator errors
//! come back as outcomes; only unexpected failures escape as `Err`.

mod bag;
mod entity;
#[cfg(test)]
pub(crate) mod testing;

pub use bag::{
    bag_copy, bag_package, bag_rebag, bag_validate, BagRequest, CopyRequest, RebagRequest,
    ValidateRequest,
};
pub use entity::{entity_add, entity_edit, entity_show, AddRequest, EditRequest, ShowRequest};
