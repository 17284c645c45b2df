//! Moving one table's rows: extraction, normalization, loading, and the
//! index and trigger handling around the load.

pub mod extract;
pub mod indexes;
pub mod loader;
pub mod normalize;
pub mod triggers;

pub use extract::extract;
pub use indexes::IndexManager;
pub use loader::{BatchLoader, LoadOutcome};
pub use normalize::{repair_utf8, transliterate_ascii, ValueNormalizer};
pub use triggers::SuppressedTriggers;
