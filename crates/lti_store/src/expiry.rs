//! Per-table time-to-live policy and the insert-triggered housekeeping rules.
//!
//! TTL enforcement is deliberately dual: the triggers installed here bound
//! growth of tables nobody reads, and `db::Database::get` re-checks age at
//! read time to catch rows that expired since the last insert.  Neither
//! mechanism alone is sufficient.

use chrono::{DateTime, Duration, Utc};

use crate::schema::Table;

impl Table {
    /// Seconds a row may live before it is considered expired.
    /// Durable tables return None and are exempt from expiry logic.
    pub fn ttl_seconds(&self) -> Option<i64> {
        match self {
            Table::IdToken | Table::ContextToken => Some(86_400),
            Table::AccessToken => Some(3_600),
            Table::Nonce => Some(10),
            Table::Platform | Table::PublicKey | Table::PrivateKey => None,
        }
    }
}

/// True iff `table` carries a TTL and the row has aged out.
/// Expiry is computed against the immutable creation timestamp, never the
/// update timestamp.
pub fn is_expired(table: Table, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match table.ttl_seconds() {
        Some(ttl) => now.signed_duration_since(created_at) >= Duration::seconds(ttl),
        None => false,
    }
}

/// One insert-triggered cleanup statement per TTL-bearing table: on every
/// insert, delete rows whose age exceeds the TTL.  `IF NOT EXISTS` makes
/// re-installation at setup idempotent.
pub fn housekeeping_rules() -> Vec<String> {
    Table::ALL
        .iter()
        .filter_map(|table| {
            let ttl = table.ttl_seconds()?;
            let coll = table.def().collection;
            Some(format!(
                "CREATE TRIGGER IF NOT EXISTS \"expire_{coll}\" AFTER INSERT ON \"{coll}\" \
                 BEGIN \
                 DELETE FROM \"{coll}\" WHERE datetime(\"createdAt\") <= datetime('now', '-{ttl} seconds'); \
                 END"
            ))
        })
        .collect()
}
