pub mod error;
pub mod types;

pub use error::{CollectionError, Result};
pub use types::{Capabilities, FieldData, FieldsUpdate, Item, ItemId, Params};
