//! In-memory storage for virtual tables.
//!
//! This crate provides:
//! - the value model: [`ItemData`], [`ItemGroup`] and [`ItemTable`] with
//!   its join primitives and equality index
//! - the schema registry: static column definitions and the factory that
//!   materializes each virtual table

pub mod error;
pub mod item;
pub mod item_group;
pub mod item_table;
pub mod schema;

pub use error::{Result, StorageError};
pub use item::{ItemData, ItemDataPtr, ItemId, ItemKey, ItemType, ItemValue, ITEM_ID_ANONY};
pub use item_group::{ItemGroup, ItemGroupPtr};
pub use item_table::{ItemIndex, ItemTable, ItemTablePtr};
pub use schema::{
    ColumnDef, SqlColumnType, SqlKeyType, TableFactory, TableRegistry, TableStaticInfo,
};
