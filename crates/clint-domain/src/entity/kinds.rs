use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Every record type the catalog serves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
    AsRefStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Machine,
    Collection,
    Project,
    Item,
    Bag,
    BagAction,
}

impl EntityKind {
    #[must_use]
    pub fn table(self) -> &'static FieldTable {
        match self {
            Self::Machine => &MACHINE,
            Self::Collection => &COLLECTION,
            Self::Project => &PROJECT,
            Self::Item => &ITEM,
            Self::Bag => &BAG,
            Self::BagAction => &BAG_ACTION,
        }
    }

    /// Human-facing name used in display output (`Item`, `BagAction`).
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Machine => "Machine",
            Self::Collection => "Collection",
            Self::Project => "Project",
            Self::Item => "Item",
            Self::Bag => "Bag",
            Self::BagAction => "BagAction",
        }
    }
}

/// Compile-time tag tying a `Record` to its kind.
pub trait Kind {
    const KIND: EntityKind;
}

macro_rules! kind_marker {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub enum $name {}

            impl Kind for $name {
                const KIND: EntityKind = EntityKind::$name;
            }
        )*
    };
}

kind_marker!(Machine, Collection, Project, Item, Bag, BagAction);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
pub enum Shape {
    Text,
    Relation(EntityKind),
    Options(&'static OptionTable),
    Payload,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub access: Access,
    pub shape: Shape,
}

impl FieldSpec {
    const fn read_only(name: &'static str) -> Self {
        Self {
            name,
            access: Access::ReadOnly,
            shape: Shape::Text,
        }
    }

    const fn text(name: &'static str) -> Self {
        Self {
            name,
            access: Access::ReadWrite,
            shape: Shape::Text,
        }
    }

    const fn relation(name: &'static str, target: EntityKind) -> Self {
        Self {
            name,
            access: Access::ReadWrite,
            shape: Shape::Relation(target),
        }
    }

    const fn options(name: &'static str, table: &'static OptionTable) -> Self {
        Self {
            name,
            access: Access::ReadWrite,
            shape: Shape::Options(table),
        }
    }

    const fn payload(name: &'static str) -> Self {
        Self {
            name,
            access: Access::ReadWrite,
            shape: Shape::Payload,
        }
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }
}

/// Closed code/label table for an enumerated field. Codes are small
/// integers rendered as strings.
#[derive(Debug)]
pub struct OptionTable {
    pub entries: &'static [(&'static str, &'static str)],
}

impl OptionTable {
    #[must_use]
    pub fn label(&self, code: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, label)| *label)
    }

    /// Accepts either a code or a label (case-insensitive) and returns the code.
    #[must_use]
    pub fn code(&self, input: &str) -> Option<&'static str> {
        let input = input.trim();
        self.entries
            .iter()
            .find(|(code, label)| *code == input || label.eq_ignore_ascii_case(input))
            .map(|(code, _)| *code)
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(_, label)| *label)
    }
}

#[derive(Debug)]
pub struct FieldTable {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
    /// Secondary lookup field tried when a fetch by id returns not-found.
    pub alternate_key: Option<&'static str>,
    /// Records that may be created but never updated.
    pub immutable: bool,
}

impl FieldTable {
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn read_write(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|spec| !spec.is_read_only())
    }

    pub fn read_only(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|spec| spec.is_read_only())
    }

    pub fn relations(&self) -> impl Iterator<Item = (&'static str, EntityKind)> {
        self.fields.iter().filter_map(|spec| match spec.shape {
            Shape::Relation(target) => Some((spec.name, target)),
            _ => None,
        })
    }
}

pub static ITEM_TYPES: OptionTable = OptionTable {
    entries: &[
        ("1", "book"),
        ("2", "microfilm"),
        ("3", "audio"),
        ("4", "video"),
        ("5", "mixed"),
        ("6", "other"),
    ],
};

pub static BAG_TYPES: OptionTable = OptionTable {
    entries: &[("1", "access"), ("2", "preservation"), ("3", "export")],
};

pub static BAG_ACTIONS: OptionTable = OptionTable {
    entries: &[
        ("1", "added"),
        ("2", "updated"),
        ("3", "moved"),
        ("4", "validated"),
        ("5", "imported"),
        ("6", "deleted"),
        ("7", "copied"),
    ],
};

const ID: FieldSpec = FieldSpec::read_only("id");
const CREATED: FieldSpec = FieldSpec::read_only("created");
const RESOURCE_URI: FieldSpec = FieldSpec::read_only("resource_uri");
const STATS: FieldSpec = FieldSpec::read_only("stats");

static MACHINE: FieldTable = FieldTable {
    kind: EntityKind::Machine,
    fields: &[
        ID,
        RESOURCE_URI,
        FieldSpec::text("name"),
        FieldSpec::text("url"),
        FieldSpec::text("notes"),
    ],
    alternate_key: None,
    immutable: false,
};

static COLLECTION: FieldTable = FieldTable {
    kind: EntityKind::Collection,
    fields: &[
        ID,
        CREATED,
        RESOURCE_URI,
        STATS,
        FieldSpec::text("name"),
        FieldSpec::text("description"),
        FieldSpec::text("manager"),
    ],
    alternate_key: None,
    immutable: false,
};

static PROJECT: FieldTable = FieldTable {
    kind: EntityKind::Project,
    fields: &[
        ID,
        CREATED,
        RESOURCE_URI,
        STATS,
        FieldSpec::text("name"),
        FieldSpec::text("manager"),
        FieldSpec::relation("collection", EntityKind::Collection),
        FieldSpec::text("start_date"),
        FieldSpec::text("end_date"),
    ],
    alternate_key: None,
    immutable: false,
};

static ITEM: FieldTable = FieldTable {
    kind: EntityKind::Item,
    fields: &[
        ID,
        CREATED,
        RESOURCE_URI,
        FieldSpec::text("title"),
        FieldSpec::text("local_id"),
        FieldSpec::relation("collection", EntityKind::Collection),
        FieldSpec::relation("project", EntityKind::Project),
        FieldSpec::options("original_item_type", &ITEM_TYPES),
        FieldSpec::text("rawfiles_loc"),
        FieldSpec::text("qcfiles_loc"),
        FieldSpec::text("qafiles_loc"),
        FieldSpec::text("finfiles_loc"),
        FieldSpec::text("ocrfiles_loc"),
        FieldSpec::text("notes"),
    ],
    alternate_key: Some("local_id"),
    immutable: false,
};

static BAG: FieldTable = FieldTable {
    kind: EntityKind::Bag,
    fields: &[
        ID,
        CREATED,
        RESOURCE_URI,
        FieldSpec::text("bagname"),
        FieldSpec::relation("item", EntityKind::Item),
        FieldSpec::relation("machine", EntityKind::Machine),
        FieldSpec::text("path"),
        FieldSpec::options("bag_type", &BAG_TYPES),
        FieldSpec::payload("payload"),
    ],
    alternate_key: Some("bagname"),
    immutable: false,
};

static BAG_ACTION: FieldTable = FieldTable {
    kind: EntityKind::BagAction,
    fields: &[
        ID,
        RESOURCE_URI,
        FieldSpec::relation("bag", EntityKind::Bag),
        FieldSpec::text("timestamp"),
        FieldSpec::options("action", &BAG_ACTIONS),
        FieldSpec::text("note"),
    ],
    alternate_key: None,
    immutable: true,
};

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_table_marks_identity_read_only() {
        for kind in EntityKind::iter() {
            let table = kind.table();
            assert_eq!(table.kind, kind);
            for name in ["id", "resource_uri"] {
                let spec = table.spec(name).expect("identity fields are tabled");
                assert!(spec.is_read_only(), "{kind}.{name} must be read-only");
            }
        }
    }

    #[test]
    fn alternate_keys_are_read_write_fields() {
        for kind in EntityKind::iter() {
            if let Some(field) = kind.table().alternate_key {
                let spec = kind.table().spec(field).expect("alternate key is tabled");
                assert!(!spec.is_read_only());
            }
        }
    }

    #[test]
    fn option_tables_map_codes_and_labels() {
        assert_eq!(BAG_TYPES.code("Preservation"), Some("2"));
        assert_eq!(BAG_TYPES.code("2"), Some("2"));
        assert_eq!(BAG_TYPES.label("2"), Some("preservation"));
        assert_eq!(BAG_TYPES.code("archive"), None);
        assert_eq!(BAG_ACTIONS.label("1"), Some("added"));
        assert_eq!(ITEM_TYPES.code("other"), Some("6"));
    }

    #[test]
    fn kinds_round_trip_through_resource_names() {
        assert_eq!(EntityKind::BagAction.to_string(), "bagaction");
        assert_eq!("Item".parse::<EntityKind>().ok(), Some(EntityKind::Item));
        assert_eq!(
            EntityKind::Bag.table().relations().collect::<Vec<_>>(),
            vec![("item", EntityKind::Item), ("machine", EntityKind::Machine)]
        );
    }
}
