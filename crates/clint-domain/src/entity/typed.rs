//! Named accessors for the fields the bag workflow touches.

use super::error::EntityError;
use super::kinds::{Bag, BagAction, EntityKind, Item};
use super::record::Record;
use super::value::{PayloadFile, Relation};
use crate::catalog::SharedCatalog;

impl Record<Item> {
    pub fn title(&mut self) -> Result<Option<String>, EntityError> {
        self.text("title")
    }

    pub fn set_title(&mut self, title: &str) -> Result<(), EntityError> {
        self.set_text("title", title)
    }

    pub fn local_id(&mut self) -> Result<Option<String>, EntityError> {
        self.text("local_id")
    }

    pub fn set_local_id(&mut self, local_id: &str) -> Result<(), EntityError> {
        self.set_text("local_id", local_id)
    }

    pub fn set_collection(&mut self, id: &str) -> Result<(), EntityError> {
        self.set_relation("collection", Relation::to(EntityKind::Collection, id))
    }

    pub fn set_project(&mut self, id: &str) -> Result<(), EntityError> {
        self.set_relation("project", Relation::to(EntityKind::Project, id))
    }

    pub fn set_item_type(&mut self, label_or_code: &str) -> Result<(), EntityError> {
        self.set_option("original_item_type", label_or_code)
    }
}

impl Record<Bag> {
    pub fn bagname(&mut self) -> Result<Option<String>, EntityError> {
        self.text("bagname")
    }

    pub fn set_bagname(&mut self, bagname: &str) -> Result<(), EntityError> {
        self.set_text("bagname", bagname)
    }

    pub fn path(&mut self) -> Result<Option<String>, EntityError> {
        self.text("path")
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), EntityError> {
        self.set_text("path", path)
    }

    pub fn item_id(&mut self) -> Result<Option<String>, EntityError> {
        self.relation_id("item")
    }

    pub fn set_item(&mut self, id: &str) -> Result<(), EntityError> {
        self.set_relation("item", Relation::to(EntityKind::Item, id))
    }

    pub fn machine_id(&mut self) -> Result<Option<String>, EntityError> {
        self.relation_id("machine")
    }

    pub fn set_machine(&mut self, id: &str) -> Result<(), EntityError> {
        self.set_relation("machine", Relation::to(EntityKind::Machine, id))
    }

    pub fn set_bag_type(&mut self, label_or_code: &str) -> Result<(), EntityError> {
        self.set_option("bag_type", label_or_code)
    }

    pub fn files(&mut self) -> Result<Vec<PayloadFile>, EntityError> {
        self.payload("payload")
    }

    pub fn set_files(&mut self, files: Vec<PayloadFile>) -> Result<(), EntityError> {
        self.set_payload("payload", files)
    }
}

impl Record<BagAction> {
    /// Creates an audit entry for `bag_id`. Audit entries are never updated.
    pub fn record_action(
        catalog: SharedCatalog,
        bag_id: &str,
        action: &str,
        note: &str,
        timestamp: &str,
    ) -> Result<Self, EntityError> {
        let mut entry = Self::new(catalog);
        entry.set_relation("bag", Relation::to(EntityKind::Bag, bag_id))?;
        entry.set_option("action", action)?;
        entry.set_text("note", note)?;
        entry.set_text("timestamp", timestamp)?;
        entry.save()?;
        Ok(entry)
    }

    pub fn action(&mut self) -> Result<Option<&'static str>, EntityError> {
        self.label("action")
    }
}
