use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{fs::create_dir_all, path::Path};

/// Opens a pool for the device registry. Accepts plain paths as well as
/// `sqlite:` URLs and creates the database file when it is missing.
pub async fn create_sqlite_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let path = database_url.trim_start_matches("sqlite:");

    if path.starts_with(":memory:") {
        // Every connection would otherwise see its own empty database
        return SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await;
    }

    ensure_parent_dir_exists(path)?;

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new().connect_with(options).await
}

fn ensure_parent_dir_exists(path: &str) -> std::io::Result<()> {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
