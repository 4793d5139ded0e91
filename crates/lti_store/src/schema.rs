//! Static shapes of the seven credential collections.
//!
//! Table dispatch is a closed enum, not a string registry — adding a table
//! means adding a variant, and every `match` below is checked exhaustively.
//! Column names are the wire contract (filters, items, and patches are keyed
//! by them), so the camelCase names of the original deployments are kept.

use std::fmt;

/// The seven persisted entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    IdToken,
    ContextToken,
    Platform,
    PublicKey,
    PrivateKey,
    AccessToken,
    Nonce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Plain text value.
    Text,
    /// JSON document serialized to text.
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Declared VARCHAR bound; None means unbounded TEXT.
    pub max_len: Option<u32>,
}

const fn text(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Text, max_len: None }
}

const fn json(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Json, max_len: None }
}

const fn bounded(name: &'static str, max_len: u32) -> Column {
    Column { name, kind: ColumnKind::Text, max_len: Some(max_len) }
}

/// Fixed definition of one collection: its backing table name, primary key,
/// and column whitelist. Every piece of SQL in the store is built from these.
pub struct TableDef {
    pub collection: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [Column],
}

/// Backend-managed timestamp columns present on every table. Written by the
/// store on insert/modify, filterable, never patchable.
pub static TIMESTAMP_COLUMNS: [Column; 2] = [text("createdAt"), text("updatedAt")];

static IDTOKEN: TableDef = TableDef {
    collection: "idtokens",
    primary_key: "iss",
    columns: &[
        text("iss"),
        text("issuer_code"),
        text("user"),
        json("roles"),
        json("userInfo"),
        json("platformInfo"),
        json("endpoint"),
        json("namesRoles"),
    ],
};

static CONTEXTTOKEN: TableDef = TableDef {
    collection: "contexttokens",
    primary_key: "path",
    columns: &[
        text("path"),
        text("user"),
        json("context"),
        json("resource"),
        json("custom"),
    ],
};

static PLATFORM: TableDef = TableDef {
    collection: "platforms",
    primary_key: "platformUrl",
    columns: &[
        text("platformName"),
        text("platformUrl"),
        text("clientId"),
        text("authEndpoint"),
        text("accesstokenEndpoint"),
        text("kid"),
        json("authConfig"),
    ],
};

static PUBLICKEY: TableDef = TableDef {
    collection: "publickeys",
    primary_key: "kid",
    columns: &[text("kid"), text("iv"), bounded("data", 10_000)],
};

static PRIVATEKEY: TableDef = TableDef {
    collection: "privatekeys",
    primary_key: "kid",
    columns: &[text("kid"), text("iv"), bounded("data", 10_000)],
};

static ACCESSTOKEN: TableDef = TableDef {
    collection: "accesstokens",
    primary_key: "platformUrl",
    columns: &[text("platformUrl"), text("iv"), text("data")],
};

static NONCE: TableDef = TableDef {
    collection: "nonces",
    primary_key: "nonce",
    columns: &[text("nonce")],
};

impl Table {
    pub const ALL: [Table; 7] = [
        Table::IdToken,
        Table::ContextToken,
        Table::Platform,
        Table::PublicKey,
        Table::PrivateKey,
        Table::AccessToken,
        Table::Nonce,
    ];

    pub fn def(&self) -> &'static TableDef {
        match self {
            Table::IdToken => &IDTOKEN,
            Table::ContextToken => &CONTEXTTOKEN,
            Table::Platform => &PLATFORM,
            Table::PublicKey => &PUBLICKEY,
            Table::PrivateKey => &PRIVATEKEY,
            Table::AccessToken => &ACCESSTOKEN,
            Table::Nonce => &NONCE,
        }
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Table::IdToken => "idtoken",
            Table::ContextToken => "contexttoken",
            Table::Platform => "platform",
            Table::PublicKey => "publickey",
            Table::PrivateKey => "privatekey",
            Table::AccessToken => "accesstoken",
            Table::Nonce => "nonce",
        }
    }

    /// Look up a column by name, timestamp columns included.
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.def()
            .columns
            .iter()
            .chain(TIMESTAMP_COLUMNS.iter())
            .find(|c| c.name == name)
    }

    /// Idempotent DDL for this table.
    pub fn create_table_sql(&self) -> String {
        let def = self.def();
        let mut cols: Vec<String> = def
            .columns
            .iter()
            .map(|c| {
                let ty = match c.max_len {
                    Some(n) => format!("VARCHAR({n})"),
                    None => "TEXT".to_string(),
                };
                if c.name == def.primary_key {
                    format!("\"{}\" {} PRIMARY KEY", c.name, ty)
                } else {
                    format!("\"{}\" {}", c.name, ty)
                }
            })
            .collect();
        for ts in &TIMESTAMP_COLUMNS {
            cols.push(format!("\"{}\" TEXT NOT NULL", ts.name));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            def.collection,
            cols.join(", ")
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_primary_key_is_a_declared_column() {
        for table in Table::ALL {
            let def = table.def();
            assert!(
                def.columns.iter().any(|c| c.name == def.primary_key),
                "{table}: primary key {} not in column list",
                def.primary_key
            );
        }
    }

    #[test]
    fn ddl_is_idempotent_and_quotes_identifiers() {
        for table in Table::ALL {
            let sql = table.create_table_sql();
            assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"));
            assert!(sql.contains("\"createdAt\" TEXT NOT NULL"));
            assert!(sql.contains("PRIMARY KEY"));
        }
    }

    #[test]
    fn key_material_blobs_are_size_bounded() {
        for table in [Table::PublicKey, Table::PrivateKey] {
            let data = table.column("data").expect("data column");
            assert_eq!(data.max_len, Some(10_000));
        }
    }

    #[test]
    fn column_lookup_covers_timestamps_and_rejects_strays() {
        assert!(Table::Platform.column("createdAt").is_some());
        assert!(Table::Platform.column("authConfig").is_some());
        assert!(Table::Platform.column("no_such_column").is_none());
        // Envelope columns exist only on encrypted-capable tables.
        assert!(Table::AccessToken.column("iv").is_some());
        assert!(Table::Platform.column("iv").is_none());
    }
}
