//! Encrypted CRUD surface: sealing on insert, transparent decrypt on get,
//! decrypt-merge-reencrypt on modify, and the documented modify race.

use lti_store::{Database, Record, Table};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

const SECRET: &str = "LTIKEY-dont-tell";

async fn open_store(dir: &TempDir) -> Database {
    let path = dir.path().join(format!("store-{}.db", Uuid::new_v4()));
    let db = Database::open(&path).await.expect("open store");
    db.setup().await.expect("setup");
    db
}

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("object literal")
}

#[tokio::test]
async fn sealed_insert_round_trips_and_stays_opaque_without_the_secret() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    let item = json!({"token": "tok-123", "scopes": ["lineitem", "score"]});
    let index = record(json!({"platformUrl": "https://lms.example.com"}));
    assert!(db
        .insert(Some(SECRET), Table::AccessToken, &item, Some(&index))
        .await
        .expect("insert"));

    let filter = record(json!({"platformUrl": "https://lms.example.com"}));

    // With the secret: the original payload, plus normalized timestamps.
    let rows = db
        .get(Some(SECRET), Table::AccessToken, Some(&filter))
        .await
        .expect("get")
        .expect("row present");
    assert_eq!(rows.len(), 1);
    let payload = rows[0].as_object().unwrap();
    assert_eq!(payload["token"], json!("tok-123"));
    assert_eq!(payload["scopes"], json!(["lineitem", "score"]));
    assert!(payload["createdAt"].is_i64());

    // Without the secret: only the opaque envelope, never the payload.
    let rows = db
        .get(None, Table::AccessToken, Some(&filter))
        .await
        .unwrap()
        .unwrap();
    let row = rows[0].as_object().unwrap();
    assert_eq!(row["platformUrl"], json!("https://lms.example.com"));
    assert!(!row.contains_key("token"));
    let iv = row["iv"].as_str().unwrap();
    assert_eq!(iv.len(), 32, "16-byte IV, hex-encoded");
    assert!(hex::decode(iv).is_ok());
    assert!(!row["data"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn each_sealed_write_draws_a_fresh_iv() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    let item = json!({"token": "same"});
    for url in ["https://a.example.com", "https://b.example.com"] {
        let index = record(json!({ "platformUrl": url }));
        assert!(db
            .insert(Some(SECRET), Table::AccessToken, &item, Some(&index))
            .await
            .unwrap());
    }

    let rows = db.get(None, Table::AccessToken, None).await.unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0]["iv"], rows[1]["iv"]);
    assert_ne!(rows[0]["data"], rows[1]["data"]);
}

#[tokio::test]
async fn wrong_secret_never_reveals_the_payload() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    let item = json!({"token": "tok-123"});
    let index = record(json!({"platformUrl": "https://lms.example.com"}));
    assert!(db
        .insert(Some(SECRET), Table::AccessToken, &item, Some(&index))
        .await
        .unwrap());

    let filter = record(json!({"platformUrl": "https://lms.example.com"}));
    match db.get(Some("not-the-secret"), Table::AccessToken, Some(&filter)).await {
        Err(_) => {}
        Ok(rows) => assert_ne!(
            rows.and_then(|r| r[0].get("token").cloned()),
            Some(json!("tok-123"))
        ),
    }
}

#[tokio::test]
async fn modify_applies_only_the_first_patch_field() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    let item = json!({"a": 1, "b": 2});
    let index = record(json!({"platformUrl": "https://lms.example.com"}));
    assert!(db
        .insert(Some(SECRET), Table::AccessToken, &item, Some(&index))
        .await
        .unwrap());

    // Multi-field patch: the single-field contract honors `b` and drops `c`.
    let filter = record(json!({"platformUrl": "https://lms.example.com"}));
    let patch = record(json!({"b": 3, "c": 4}));
    db.modify(Some(SECRET), Table::AccessToken, &filter, &patch)
        .await
        .expect("modify");

    let rows = db
        .get(Some(SECRET), Table::AccessToken, Some(&filter))
        .await
        .unwrap()
        .unwrap();
    let payload = rows[0].as_object().unwrap();
    assert_eq!(payload["a"], json!(1));
    assert_eq!(payload["b"], json!(3));
    assert!(!payload.contains_key("c"));
}

#[tokio::test]
async fn non_object_payloads_seal_and_open_too() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    // Key material is stored as a bare JSON string, not an object.
    let pem = json!("-----BEGIN PUBLIC KEY-----\nMFkw...\n-----END PUBLIC KEY-----");
    let index = record(json!({"kid": "key-1"}));
    assert!(db
        .insert(Some(SECRET), Table::PublicKey, &pem, Some(&index))
        .await
        .unwrap());

    let filter = record(json!({"kid": "key-1"}));
    let rows = db
        .get(Some(SECRET), Table::PublicKey, Some(&filter))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows[0], pem);
}

#[tokio::test]
async fn concurrent_modify_race_is_possible_not_prevented() {
    let dir = TempDir::new().unwrap();
    let db = open_store(&dir).await;

    let item = json!({"a": 1});
    let index = record(json!({"platformUrl": "https://lms.example.com"}));
    assert!(db
        .insert(Some(SECRET), Table::AccessToken, &item, Some(&index))
        .await
        .unwrap());

    let filter = record(json!({"platformUrl": "https://lms.example.com"}));
    let db1 = db.clone();
    let db2 = db.clone();
    let f1 = filter.clone();
    let f2 = filter.clone();
    let p1 = record(json!({"b": 2}));
    let p2 = record(json!({"c": 3}));

    // Two read-merge-write cycles over the same row: one field change may be
    // lost.  The store documents this; it does not prevent it.
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { db1.modify(Some(SECRET), Table::AccessToken, &f1, &p1).await }),
        tokio::spawn(async move { db2.modify(Some(SECRET), Table::AccessToken, &f2, &p2).await }),
    );
    r1.unwrap().expect("first modify");
    r2.unwrap().expect("second modify");

    let rows = db
        .get(Some(SECRET), Table::AccessToken, Some(&filter))
        .await
        .unwrap()
        .unwrap();
    let payload = rows[0].as_object().unwrap();
    assert_eq!(payload["a"], json!(1), "untouched field always survives");
    let b = payload.contains_key("b");
    let c = payload.contains_key("c");
    assert!(b || c, "at least one concurrent patch lands; both only without interleaving");
}
