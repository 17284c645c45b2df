//! MySQL/MariaDB source driver.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! The source must be quiesced for the duration of a run: pages are read with
//! `LIMIT/OFFSET`, so concurrent inserts or deletes can shift rows across page
//! boundaries.

mod dialect;
mod reader;

pub use reader::MysqlReader;
