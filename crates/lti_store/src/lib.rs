//! lti_store — encrypted, TTL-governed credential store for an LTI provider
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt.  Rows written with a secret are stored
//! as `{primary key, iv, data}` only — the payload is sealed by `lti_crypto`
//! (AES-256-CBC, hex-encoded) and never reaches a cleartext column.  Reads
//! with the secret decrypt in place; reads without it surface the opaque
//! pair as stored.
//!
//! # Expiry
//! Two mechanisms, both required:
//! - Insert-triggered housekeeping rules installed at setup bound table
//!   growth even when nothing ever reads.
//! - Every `get` re-checks row age, so a row that expired between the last
//!   insert and the read is pruned from the result (background delete)
//!   instead of returned.

pub mod db;
pub mod error;
pub mod expiry;
pub mod schema;

pub use db::{Database, Record};
pub use error::StoreError;
pub use schema::Table;
