use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{db_types::setting_keys, SqliteDatabase};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

/// A database URL in the system temp directory that no other test is using.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/paycode_test_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("Could not drop database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {url}");
}

/// Creates a fresh migrated database and returns a handle to it.
pub async fn fresh_database() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

/// Gives `account_id` a secret key and, if `app_id` is provided, an active merchant mapping.
pub async fn seed_merchant(db: &SqliteDatabase, account_id: i64, app_id: Option<&str>, secret: &str) {
    db.save_account_setting(account_id, setting_keys::SECRET_KEY, secret).await.expect("Error saving secret key");
    if let Some(app_id) = app_id {
        db.save_merchant_mapping(app_id, account_id, true).await.expect("Error saving merchant mapping");
    }
}
