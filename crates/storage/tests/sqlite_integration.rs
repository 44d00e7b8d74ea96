use storage::repository::{KeyValueStore, Storage, keys};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_set_get_delete_round_trip() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert_eq!(repo.get(keys::DEVICE_ID).await.unwrap(), None);

    repo.set(keys::DEVICE_ID, "device-1700000000000").await.unwrap();
    assert_eq!(
        repo.get(keys::DEVICE_ID).await.unwrap().as_deref(),
        Some("device-1700000000000")
    );

    repo.delete(keys::DEVICE_ID).await.unwrap();
    assert_eq!(repo.get(keys::DEVICE_ID).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_set_overwrites_in_place() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_overwrite?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.set(keys::USER_ID, "7").await.unwrap();
    repo.set(keys::USER_ID, "8").await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries WHERE key = ?1")
        .bind(keys::USER_ID)
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(repo.get(keys::USER_ID).await.unwrap().as_deref(), Some("8"));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.set(keys::HAS_LAUNCHED, "true").await.unwrap();
    repo.migrate().await.expect("second migrate");

    assert_eq!(
        repo.get(keys::HAS_LAUNCHED).await.unwrap().as_deref(),
        Some("true")
    );
    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn storage_sqlite_exposes_kv_store() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.kv.set(keys::SAVED_RESULTS, "[]").await.unwrap();
    assert_eq!(
        storage.kv.get(keys::SAVED_RESULTS).await.unwrap().as_deref(),
        Some("[]")
    );
}
