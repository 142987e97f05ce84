//! Library-level operations: managing library rows, running a full
//! scan + reconciliation inside one transaction, and serving pages.

use std::path::{Path, PathBuf};

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::broadcast;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::archive::{Archive, PageBytes};
use crate::catalog::SqliteCatalog;
use crate::error::{CatalogError, CatalogResult, OptionExt};
use crate::scanner;
use crate::sync;
use crate::types::{Book, Library, Page, ScanEvent, ScanOptions, SyncSummary, Title, TitleQuery, TitleSort};

const TITLE_COLUMNS: &str = "id, library_id, name, url, created_at, updated_at, cover_width, cover_height, \
                             book_count, langs, uncensored, waifu2x, webp";

const LIKE_ESCAPE: char = '!';

pub async fn create_library(pool: &SqlitePool, name: &str, root: &str) -> CatalogResult<Library> {
    if name.trim().is_empty() {
        return Err(CatalogError::InvalidInput("library name must not be empty".into()));
    }
    if root.contains('\0') {
        return Err(CatalogError::InvalidInput("library root contains null characters".into()));
    }
    if !Path::new(root).is_dir() {
        return Err(CatalogError::NotFound(format!("library root is not a directory: {}", root)));
    }
    if find_library_by_root(pool, root).await?.is_some() {
        return Err(CatalogError::Conflict(format!("a library already uses root {}", root)));
    }

    let res = sqlx::query("INSERT INTO libraries (name, root) VALUES (?1, ?2)")
        .bind(name.trim())
        .bind(root)
        .execute(pool)
        .await?;
    let library = find_library(pool, res.last_insert_rowid()).await?;
    tracing::info!(id = library.id, name = %library.name, root = %library.root, "created library");
    Ok(library)
}

pub async fn list_libraries(pool: &SqlitePool) -> CatalogResult<Vec<Library>> {
    let libraries = sqlx::query_as::<_, Library>(
        "SELECT id, name, root, created_at FROM libraries ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(libraries)
}

pub async fn find_library(pool: &SqlitePool, id: i64) -> CatalogResult<Library> {
    sqlx::query_as::<_, Library>("SELECT id, name, root, created_at FROM libraries WHERE id=?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_not_found("Library")
}

pub async fn find_library_by_root(pool: &SqlitePool, root: &str) -> CatalogResult<Option<Library>> {
    let library =
        sqlx::query_as::<_, Library>("SELECT id, name, root, created_at FROM libraries WHERE root=?1")
            .bind(root)
            .fetch_optional(pool)
            .await?;
    Ok(library)
}

/// Deletes a library with all of its titles, books and pages.
pub async fn delete_library(pool: &SqlitePool, id: i64) -> CatalogResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM pages WHERE book_id IN (SELECT id FROM books WHERE library_id=?1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM books WHERE library_id=?1").bind(id).execute(&mut *tx).await?;
    sqlx::query("DELETE FROM titles WHERE library_id=?1").bind(id).execute(&mut *tx).await?;
    let res = sqlx::query("DELETE FROM libraries WHERE id=?1").bind(id).execute(&mut *tx).await?;
    if res.rows_affected() == 0 {
        return Err(CatalogError::NotFound("Library not found".into()));
    }
    tx.commit().await?;
    tracing::info!(id, "deleted library");
    Ok(())
}

/// Scans the library root and reconciles the catalog with it.
///
/// The reconciliation runs in one transaction: it is committed when every
/// mutation and page scan succeeded and rolled back otherwise.
pub async fn scan_library(
    pool: &SqlitePool,
    library: &Library,
    options: &ScanOptions,
    events: &broadcast::Sender<ScanEvent>,
    cancel: &CancellationToken,
) -> CatalogResult<SyncSummary> {
    let _ = events.send(ScanEvent::Started { library_id: library.id, root: library.root.clone() });

    let scan = scanner::scan_library_root(&PathBuf::from(&library.root), options, events).await?;
    let _ = events.send(ScanEvent::Scanned { titles: scan.titles.len(), books: scan.book_total() });
    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled);
    }

    let mut tx = pool.begin().await?;
    let result = {
        let mut store = SqliteCatalog::new(&mut *tx);
        sync::sync_library(library.id, scan, &mut store, options.worker_count(), events, cancel).await
    };

    match result {
        Ok(summary) => {
            tx.commit().await?;
            tracing::info!(
                library = %library.name,
                titles_added = summary.titles_added,
                titles_updated = summary.titles_updated,
                titles_removed = summary.titles_removed,
                books_added = summary.books_added,
                books_updated = summary.books_updated,
                books_removed = summary.books_removed,
                pages = summary.pages_inserted,
                "library synchronized"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                tracing::warn!(library = %library.name, "rollback failed: {}", rb);
            }
            tracing::error!(library = %library.name, "library sync failed: {}", e);
            Err(e)
        }
    }
}

pub async fn find_titles(pool: &SqlitePool, library_id: i64) -> CatalogResult<Vec<Title>> {
    let titles = sqlx::query_as::<_, Title>(&format!(
        "SELECT {} FROM titles WHERE library_id=?1 ORDER BY name ASC",
        TITLE_COLUMNS
    ))
    .bind(library_id)
    .fetch_all(pool)
    .await?;
    Ok(titles)
}

pub async fn find_title(pool: &SqlitePool, title_id: i64) -> CatalogResult<Title> {
    sqlx::query_as::<_, Title>(&format!("SELECT {} FROM titles WHERE id=?1", TITLE_COLUMNS))
        .bind(title_id)
        .fetch_optional(pool)
        .await?
        .ok_or_not_found("Title")
}

fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn push_title_filter(qb: &mut QueryBuilder<'_, Sqlite>, query: &TitleQuery) {
    qb.push(" WHERE 1=1");
    if !query.library_ids.is_empty() {
        qb.push(" AND library_id IN (");
        let mut ids = qb.separated(", ");
        for id in &query.library_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    if let Some(term) = query.search.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like_pattern(term)))
            .push(" ESCAPE '!'");
    }
}

/// One page of titles matching `query`, across libraries.
///
/// The search term matches anywhere in the name (ASCII case-insensitive);
/// `%` and `_` in it are literal.
pub async fn search_titles(pool: &SqlitePool, query: &TitleQuery) -> CatalogResult<Vec<Title>> {
    if query.size == 0 {
        return Err(CatalogError::InvalidInput("page size must be at least 1".into()));
    }
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM titles", TITLE_COLUMNS));
    push_title_filter(&mut qb, query);
    qb.push(match query.sort {
        TitleSort::Name => " ORDER BY name ASC, id ASC",
        TitleSort::CreatedAt => " ORDER BY created_at DESC, id ASC",
    });
    qb.push(" LIMIT ")
        .push_bind(i64::from(query.size))
        .push(" OFFSET ")
        .push_bind(i64::from(query.page) * i64::from(query.size));

    let titles = qb.build_query_as::<Title>().fetch_all(pool).await?;
    Ok(titles)
}

/// Number of titles matching `query`'s filters; sort and paging are ignored.
pub async fn count_titles(pool: &SqlitePool, query: &TitleQuery) -> CatalogResult<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM titles");
    push_title_filter(&mut qb, query);
    let count = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(count)
}

/// Reads the cover image `cover_file_name` from a title's folder.
pub async fn read_title_cover(pool: &SqlitePool, title_id: i64, cover_file_name: &str) -> CatalogResult<PageBytes> {
    let title = find_title(pool, title_id).await?;
    let path = Path::new(&title.url).join(cover_file_name);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match tokio::fs::read(&path).await {
        Ok(data) => Ok(PageBytes { data, extension }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CatalogError::NotFound(format!("cover of title {}", title.name)))
        }
        Err(e) => Err(CatalogError::Io(format!("failed to read {}: {}", path.display(), e))),
    }
}

pub async fn find_books(pool: &SqlitePool, title_id: i64) -> CatalogResult<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        r#"SELECT id, title_id, library_id, name, url, created_at, updated_at, page_count, format
           FROM books WHERE title_id=?1 ORDER BY name ASC"#,
    )
    .bind(title_id)
    .fetch_all(pool)
    .await?;
    Ok(books)
}

pub async fn find_book(pool: &SqlitePool, book_id: i64) -> CatalogResult<Book> {
    sqlx::query_as::<_, Book>(
        r#"SELECT id, title_id, library_id, name, url, created_at, updated_at, page_count, format
           FROM books WHERE id=?1"#,
    )
    .bind(book_id)
    .fetch_optional(pool)
    .await?
    .ok_or_not_found("Book")
}

/// Pages of a book in canonical order.
pub async fn book_pages(pool: &SqlitePool, book_id: i64) -> CatalogResult<Vec<Page>> {
    find_book(pool, book_id).await?;
    let pages = sqlx::query_as::<_, Page>(
        r#"SELECT book_id, file_index, number, width, height, favorite
           FROM pages WHERE book_id=?1 ORDER BY number ASC"#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;
    Ok(pages)
}

/// Reads page `number` of a book straight from its archive.
pub async fn read_book_page(pool: &SqlitePool, book_id: i64, number: usize) -> CatalogResult<PageBytes> {
    let book = find_book(pool, book_id).await?;
    let path = PathBuf::from(&book.url);
    task::spawn_blocking(move || Archive::open(&path)?.read_entry_at(number)).await?
}

/// Marks or unmarks page `number` of a book as a favorite.
pub async fn set_page_favorite(pool: &SqlitePool, book_id: i64, number: i64, favorite: bool) -> CatalogResult<()> {
    let res = sqlx::query("UPDATE pages SET favorite=?1 WHERE book_id=?2 AND number=?3")
        .bind(favorite)
        .bind(book_id)
        .bind(number)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(CatalogError::NotFound(format!("page {} of book {}", number, book_id)));
    }
    tracing::debug!(book_id, number, favorite, "updated page favorite");
    Ok(())
}
