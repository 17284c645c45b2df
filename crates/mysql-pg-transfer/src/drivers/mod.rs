//! Database driver implementations.
//!
//! - [`mysql`]: the source reader, over sqlx
//! - [`postgres`]: the target session, over tokio-postgres and deadpool
//! - [`common`]: TLS settings shared by both

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mysql::MysqlReader;
pub use postgres::PgWriter;
