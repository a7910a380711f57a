use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Remote identifier of a single item.
pub type ItemId = String;

/// Filter/sort parameters forwarded verbatim to the remote source.
pub type Params = BTreeMap<String, String>;

/// Field values returned by an [`ItemFieldLoader`](crate::loader::ItemFieldLoader).
pub type FieldData = serde_json::Map<String, serde_json::Value>;

/// Lightweight reference to a remote item: its kind plus its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub item_type: String,
    pub id: ItemId,
}

impl Item {
    pub fn new(item_type: impl Into<String>, id: impl Into<ItemId>) -> Self {
        Self {
            item_type: item_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.id)
    }
}

/// Edit capabilities of a collection.
///
/// `reorderable` is only meaningful when `editable` is set; the constructors
/// normalize it away otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub editable: bool,
    pub reorderable: bool,
}

impl Capabilities {
    pub const READ_ONLY: Self = Self {
        editable: false,
        reorderable: false,
    };

    pub const EDITABLE: Self = Self {
        editable: true,
        reorderable: false,
    };

    pub const REORDERABLE: Self = Self {
        editable: true,
        reorderable: true,
    };

    pub fn normalized(self) -> Self {
        Self {
            editable: self.editable,
            reorderable: self.editable && self.reorderable,
        }
    }
}

/// One delivery to a `with_item_fields` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldsUpdate {
    pub id: Option<ItemId>,
    pub data: FieldData,
    /// Provisional result; a final delivery follows.
    pub stalled: bool,
}

impl FieldsUpdate {
    pub fn stalled() -> Self {
        Self {
            id: None,
            data: FieldData::new(),
            stalled: true,
        }
    }

    pub fn resolved(id: ItemId, data: FieldData) -> Self {
        Self {
            id: Some(id),
            data,
            stalled: false,
        }
    }
}
