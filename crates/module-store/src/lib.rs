//! Namespaced record storage for bot modules.
//!
//! Each module instance gets a [`Bucket`] keyed by its instance name, so two
//! instances of the same module type never see each other's records.
//! Records are kept as JSON in memory and optionally mirrored to a file.

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::{Bucket, Store};
pub use types::Record;
