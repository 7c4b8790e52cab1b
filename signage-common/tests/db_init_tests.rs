//! Database initialization on disk

use signage_common::db::{get_json, init_database, set_json};
use signage_common::model::AppSettings;

#[tokio::test]
async fn test_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("deeper").join("signage.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let empty: Option<AppSettings> = get_json(&pool, "settings_x").await.unwrap();
    assert!(empty.is_none());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("signage.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        let settings = AppSettings {
            marquee_text: "HALL B".to_string(),
            ..AppSettings::default()
        };
        set_json(&pool, "settings_x", &settings).await.unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();
    let settings: Option<AppSettings> = get_json(&pool, "settings_x").await.unwrap();
    assert_eq!(settings.unwrap().marquee_text, "HALL B");
}
