//! Utilities shared by both drivers.

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
