//! Core types and traits shared by every part of the transfer engine.
//!
//! - [`schema`]: table, column and index metadata
//! - [`value`]: tagged row values
//! - [`traits`]: source, target and schema-loader abstractions
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnDescriptor, IndexDescriptor, PkValue, SourceColumn, SourceKind, SourceTable,
    TableDescriptor,
};
pub use traits::{Engine, InsertOutcome, SchemaLoader, SourceReader, TargetWriter};
pub use value::{Numeric, Page, PageInfo, Row, SqlValue, Temporal, ValueKind};
