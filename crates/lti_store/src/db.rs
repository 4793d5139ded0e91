//! Encrypted CRUD over the credential tables.
//!
//! Every operation takes the target [`Table`] plus an optional secret.  No
//! secret means the table stores cleartext columns and items/filters map to
//! them directly.  With a secret, inserts store only `{primary key, iv,
//! data}` and reads decrypt the pair back into the original payload.
//!
//! All four operations are independent async units against a shared pool —
//! no in-process locking, no cross-call ordering.  The decrypt-merge-encrypt
//! path in [`Database::modify`] is racy by contract; callers needing
//! atomicity must serialize access per key externally.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow};
use sqlx::Row as _;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::expiry;
use crate::schema::{Column, ColumnKind, Table, TIMESTAMP_COLUMNS};

/// Equality-conjunction filter, item, index, or patch: column name → value.
pub type Record = Map<String, Value>;

/// Stored timestamp shape. Lexicographically ordered and understood by
/// SQLite's `datetime()`, so the housekeeping triggers and client-side
/// parsing agree on the same column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Central store handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the SQLite database at `db_path`.
    ///
    /// WAL journal mode and create-if-missing are configured at connection
    /// time.  Call [`Database::setup`] before first use to provision the
    /// tables and housekeeping rules.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts).await?;
        Ok(Self { pool })
    }

    /// Create the seven tables, then install the insert-triggered cleanup
    /// rules.  Safe to re-run against an already-provisioned database.
    pub async fn setup(&self) -> Result<(), StoreError> {
        for table in Table::ALL {
            sqlx::query(&table.create_table_sql())
                .execute(&self.pool)
                .await?;
        }
        for rule in expiry::housekeeping_rules() {
            sqlx::query(&rule).execute(&self.pool).await?;
        }
        debug!("schema and housekeeping rules installed");
        Ok(())
    }

    /// Close the underlying pool. Outstanding operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Fetch rows matching `filter` (omitted or empty = all rows).
    ///
    /// Rows past their table's TTL are pruned from the result and deleted in
    /// the background; the read resolves once pruning is decided, not once
    /// the delete commits.  Surviving rows have `createdAt`/`updatedAt`
    /// normalized to epoch milliseconds.  With a secret, each row's iv/data
    /// pair is decrypted and the parsed payload returned in its place,
    /// keeping the normalized timestamps.
    ///
    /// `Ok(None)` means no live row matched — an absence, not an error.
    pub async fn get(
        &self,
        secret: Option<&str>,
        table: Table,
        filter: Option<&Record>,
    ) -> Result<Option<Vec<Value>>, StoreError> {
        let (sql, binds) = select_sql(table, filter)?;
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        // Snapshot iteration: survivors are collected into a fresh vec, the
        // fetched set is never mutated while being walked.
        let now = Utc::now();
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = row_to_record(table, row)?;

            if let Some(raw) = record.get("createdAt").and_then(Value::as_str) {
                let created_at = parse_timestamp(raw)?;
                if expiry::is_expired(table, created_at, now) {
                    self.spawn_prune(table, filter);
                    continue;
                }
                record.insert(
                    "createdAt".to_string(),
                    Value::from(created_at.timestamp_millis()),
                );
            }
            if let Some(raw) = record.get("updatedAt").and_then(Value::as_str) {
                let updated_at = parse_timestamp(raw)?;
                record.insert(
                    "updatedAt".to_string(),
                    Value::from(updated_at.timestamp_millis()),
                );
            }

            let value = match secret {
                Some(secret) => {
                    let mut payload = decrypt_payload(table, &record, secret)?;
                    if let Value::Object(ref mut map) = payload {
                        for ts in &TIMESTAMP_COLUMNS {
                            if let Some(v) = record.get(ts.name) {
                                map.insert(ts.name.to_string(), v.clone());
                            }
                        }
                    }
                    payload
                }
                None => Value::Object(record),
            };
            out.push(value);
        }

        if out.is_empty() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Insert `item` into `table`.
    ///
    /// With a secret, `index` names the field that becomes the row's
    /// primary-key column; the payload itself is sealed into the iv/data
    /// pair and never reaches a cleartext column.  A missing index alongside
    /// a secret is a hard precondition failure; everything after the
    /// argument checks (serialization, encryption, SQL execution, duplicate
    /// keys) is caught, logged, and reported as `Ok(false)` so callers can
    /// treat insert as best-effort.
    pub async fn insert(
        &self,
        secret: Option<&str>,
        table: Table,
        item: &Value,
        index: Option<&Record>,
    ) -> Result<bool, StoreError> {
        let index_pair = match secret {
            Some(_) => Some(
                index
                    .and_then(|i| i.iter().next())
                    .ok_or(StoreError::MissingIndex)?,
            ),
            None => None,
        };

        match self.try_insert(secret, table, item, index_pair).await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(table = table.name(), %err, "insert failed");
                Ok(false)
            }
        }
    }

    async fn try_insert(
        &self,
        secret: Option<&str>,
        table: Table,
        item: &Value,
        index: Option<(&String, &Value)>,
    ) -> Result<(), StoreError> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        match secret {
            Some(secret) => {
                let (key_field, key_value) = index.ok_or(StoreError::MissingIndex)?;
                let col = column_def(table, key_field)?;
                columns.push(col.name);
                binds.push(bind_text(col, key_value)?);

                let sealed = lti_crypto::encrypt(serde_json::to_string(item)?.as_bytes(), secret);
                for (name, value) in [("iv", sealed.iv), ("data", sealed.data)] {
                    let col = column_def(table, name)?;
                    columns.push(col.name);
                    binds.push(value);
                }
            }
            None => {
                let Value::Object(fields) = item else {
                    return Err(StoreError::NotAnObject);
                };
                for (name, value) in fields {
                    let col = column_def(table, name)?;
                    columns.push(col.name);
                    binds.push(bind_text(col, value)?);
                }
            }
        }

        let now = now_timestamp();
        for ts in &TIMESTAMP_COLUMNS {
            columns.push(ts.name);
            binds.push(now.clone());
        }

        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        let placeholders = vec!["?"; binds.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table.def().collection,
            quoted.join(", "),
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Update rows matching `filter`.
    ///
    /// Plaintext: `patch` is applied column-by-column to every matching row.
    /// Encrypted: the first matching row is decrypted, the FIRST key/value
    /// pair of `patch` (only — single-field contract) is merged in, and the
    /// re-sealed pair is written to every matching row.  When nothing
    /// matches there is nothing to decrypt-merge and the blind update
    /// touches zero rows: still a success.
    ///
    /// The read-merge-write sequence is not atomic relative to concurrent
    /// writers on the same filter.
    pub async fn modify(
        &self,
        secret: Option<&str>,
        table: Table,
        filter: &Record,
        patch: &Record,
    ) -> Result<(), StoreError> {
        if filter.is_empty() {
            return Err(StoreError::MissingFilter);
        }
        if patch.is_empty() {
            return Err(StoreError::MissingPatch);
        }

        let mut assignments: Vec<(&'static str, String)> = Vec::new();

        match secret {
            Some(secret) => {
                let (sql, binds) = select_sql(table, Some(filter))?;
                let sql = format!("{sql} LIMIT 1");
                let mut query = sqlx::query(&sql);
                for bind in &binds {
                    query = query.bind(bind.as_str());
                }
                if let Some(row) = query.fetch_optional(&self.pool).await? {
                    let record = row_to_record(table, &row)?;
                    let Value::Object(mut payload) = decrypt_payload(table, &record, secret)?
                    else {
                        return Err(StoreError::NotAnObject);
                    };

                    // Single-field contract: only the first patch pair applies.
                    if let Some((field, value)) = patch.iter().next() {
                        payload.insert(field.clone(), value.clone());
                    }

                    let sealed = lti_crypto::encrypt(
                        serde_json::to_string(&Value::Object(payload))?.as_bytes(),
                        secret,
                    );
                    assignments.push(("iv", sealed.iv));
                    assignments.push(("data", sealed.data));
                }
            }
            None => {
                for (name, value) in patch {
                    let col = column_def(table, name)?;
                    if TIMESTAMP_COLUMNS.iter().any(|ts| ts.name == col.name) {
                        return Err(StoreError::ImmutableColumn(col.name));
                    }
                    assignments.push((col.name, bind_text(col, value)?));
                }
            }
        }

        assignments.push(("updatedAt", now_timestamp()));

        let set_clause = assignments
            .iter()
            .map(|(name, _)| format!("\"{name}\" = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut binds: Vec<String> = assignments.into_iter().map(|(_, v)| v).collect();
        let where_sql = where_clause(table, filter, &mut binds)?;
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE {}",
            table.def().collection,
            set_clause,
            where_sql
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Delete rows matching `filter`.
    ///
    /// A missing or empty filter is rejected so a stray call can never wipe
    /// a table.  Success even when zero rows match.
    pub async fn delete(&self, table: Table, filter: Option<&Record>) -> Result<(), StoreError> {
        let filter = filter
            .filter(|f| !f.is_empty())
            .ok_or(StoreError::MissingFilter)?;
        destroy(&self.pool, table, filter).await
    }

    /// Fire-and-forget delete used by the lazy-expiry path inside `get`.
    fn spawn_prune(&self, table: Table, filter: Option<&Record>) {
        let filter = filter.cloned().unwrap_or_default();
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = destroy(&pool, table, &filter).await {
                warn!(table = table.name(), %err, "background expiry delete failed");
            }
        });
    }
}

async fn destroy(pool: &SqlitePool, table: Table, filter: &Record) -> Result<(), StoreError> {
    if filter.is_empty() {
        return Err(StoreError::MissingFilter);
    }
    let mut binds = Vec::new();
    let where_sql = where_clause(table, filter, &mut binds)?;
    let sql = format!(
        "DELETE FROM \"{}\" WHERE {}",
        table.def().collection,
        where_sql
    );
    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind.as_str());
    }
    query.execute(pool).await?;
    Ok(())
}

// ── SQL assembly ─────────────────────────────────────────────────────────────
// Identifiers are never taken from caller input: every filter/item/patch key
// must resolve against the table's static column list first, and values are
// always bound.

fn column_def(table: Table, name: &str) -> Result<&'static Column, StoreError> {
    table.column(name).ok_or_else(|| StoreError::UnknownColumn {
        table: table.name(),
        column: name.to_string(),
    })
}

fn bind_text(col: &Column, value: &Value) -> Result<String, StoreError> {
    Ok(match (col.kind, value) {
        (ColumnKind::Text, Value::String(s)) => s.clone(),
        (ColumnKind::Text, other) => other.to_string(),
        (ColumnKind::Json, other) => serde_json::to_string(other)?,
    })
}

fn where_clause(
    table: Table,
    filter: &Record,
    binds: &mut Vec<String>,
) -> Result<String, StoreError> {
    let mut parts = Vec::with_capacity(filter.len());
    for (name, value) in filter {
        let col = column_def(table, name)?;
        parts.push(format!("\"{}\" = ?", col.name));
        binds.push(bind_text(col, value)?);
    }
    Ok(parts.join(" AND "))
}

fn select_sql(table: Table, filter: Option<&Record>) -> Result<(String, Vec<String>), StoreError> {
    let mut binds = Vec::new();
    let mut sql = format!("SELECT * FROM \"{}\"", table.def().collection);
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause(table, filter, &mut binds)?);
    }
    Ok((sql, binds))
}

// ── Row conversion ───────────────────────────────────────────────────────────

fn row_to_record(table: Table, row: &SqliteRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for col in table
        .def()
        .columns
        .iter()
        .chain(TIMESTAMP_COLUMNS.iter())
    {
        let raw: Option<String> = row.try_get(col.name)?;
        let Some(raw) = raw else { continue };
        let value = match col.kind {
            ColumnKind::Json => serde_json::from_str(&raw)?,
            ColumnKind::Text => Value::String(raw),
        };
        record.insert(col.name.to_string(), value);
    }
    Ok(record)
}

fn decrypt_payload(table: Table, record: &Record, secret: &str) -> Result<Value, StoreError> {
    let data = record
        .get("data")
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingEnvelope(table.name()))?;
    let iv = record
        .get("iv")
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingEnvelope(table.name()))?;
    let plaintext = lti_crypto::decrypt(data, iv, secret)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}
