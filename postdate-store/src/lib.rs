//! Persistence boundary for email records.
//!
//! The core only ever needs to read an email by id and apply a single-row
//! status update; everything else (querying, pagination, a real database) is
//! the embedding application's concern. [`EmailStore`] captures exactly that
//! contract, and [`MemoryEmailStore`] provides the in-process backend used by
//! tests and local runs.

pub mod backends;
pub mod error;
mod store;

pub use backends::MemoryEmailStore;
pub use error::{Result, StoreError};
pub use store::EmailStore;
