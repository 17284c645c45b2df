//! PostgreSQL target driver.

mod writer;

pub use writer::PgWriter;
