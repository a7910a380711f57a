// ============================================================================
// itemdeck Library
// ============================================================================

pub mod api;
pub mod collection;
pub mod config;
pub mod core;
pub mod delivery;
pub mod loader;
pub mod operation;
pub mod source;
pub mod storage;

// Re-export main types for convenience
pub use api::Api;
pub use collection::ItemCollection;
pub use config::{CollectionConfig, ConnectionPolicy};
pub use core::{
    Capabilities, CollectionError, FieldData, FieldsUpdate, Item, ItemId, Params, Result,
};
pub use delivery::{CallbackDelivery, CallbackPump, CallbackQueue};
pub use loader::{InMemoryFieldLoader, ItemFieldLoader};
pub use operation::ItemOperation;
pub use source::{InMemoryItemSource, Page, PageCursor, RemoteItemSource, SourceDescriptor};
pub use storage::CollectionArchive;
