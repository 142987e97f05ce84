use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

/// Opens (and creates if missing) the SQLite database at `url`.
pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        tracing::info!("Creating SQLite database at {}", url);
        Sqlite::create_database(url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection: every pooled connection needs cascading deletes
                sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await?;
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Cascading deletes rely on this
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS libraries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            root TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS titles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            library_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            cover_width INTEGER NOT NULL DEFAULT 0,
            cover_height INTEGER NOT NULL DEFAULT 0,
            book_count INTEGER NOT NULL DEFAULT 0,
            langs TEXT NOT NULL DEFAULT '',
            uncensored INTEGER NOT NULL DEFAULT 0,
            waifu2x INTEGER NOT NULL DEFAULT 0,
            webp INTEGER NOT NULL DEFAULT 0,
            UNIQUE(library_id, name),
            FOREIGN KEY(library_id) REFERENCES libraries(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title_id INTEGER NOT NULL,
            library_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            page_count INTEGER NOT NULL DEFAULT 0,
            format TEXT NOT NULL DEFAULT '',
            UNIQUE(title_id, name),
            FOREIGN KEY(title_id) REFERENCES titles(id) ON DELETE CASCADE,
            FOREIGN KEY(library_id) REFERENCES libraries(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS pages (
            book_id INTEGER NOT NULL,
            file_index INTEGER NOT NULL,
            number INTEGER NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            favorite INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(book_id, number),
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // Catalogs created before pages carried a favorite mark
    if let Err(e) = sqlx::query("ALTER TABLE pages ADD COLUMN favorite INTEGER NOT NULL DEFAULT 0")
        .execute(pool)
        .await
    {
        match &e {
            sqlx::Error::Database(db_err) if db_err.message().to_lowercase().contains("duplicate") => {}
            _ => {
                tracing::error!("Failed to add favorite column to pages: {}", e);
                return Err(anyhow::anyhow!("Migration failed: {}", e));
            }
        }
    }

    let indexes = [
        ("idx_titles_library", "CREATE INDEX IF NOT EXISTS idx_titles_library ON titles(library_id, name)"),
        ("idx_books_title", "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title_id, name)"),
        ("idx_books_library", "CREATE INDEX IF NOT EXISTS idx_books_library ON books(library_id)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}
