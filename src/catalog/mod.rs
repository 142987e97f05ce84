//! The persistence seam of the reconciliation engine.
//!
//! Every call runs against one caller-owned unit of work (normally an open
//! SQLite transaction); the engine never begins, commits or rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CatalogResult;
use crate::types::{Book, Page, Title, TitleFlags};

mod sqlite;

pub use sqlite::SqliteCatalog;

#[async_trait]
pub trait CatalogStore: Send {
    async fn find_titles_by_library(&mut self, library_id: i64) -> CatalogResult<Vec<Title>>;
    /// Inserts `title` and stores the assigned id back into it.
    async fn insert_title(&mut self, title: &mut Title) -> CatalogResult<()>;
    async fn update_title_modified_time(&mut self, title_id: i64, updated_at: DateTime<Utc>) -> CatalogResult<()>;
    async fn update_title_cover_dimension(&mut self, title_id: i64, width: i64, height: i64) -> CatalogResult<()>;
    async fn update_title_langs(&mut self, title_id: i64, langs: &str) -> CatalogResult<()>;
    async fn update_title_book_count(&mut self, title_id: i64, book_count: i64) -> CatalogResult<()>;
    async fn update_title_flags(&mut self, title_id: i64, flags: TitleFlags) -> CatalogResult<()>;
    async fn delete_title(&mut self, title_id: i64) -> CatalogResult<()>;

    async fn find_books_by_title(&mut self, title_id: i64) -> CatalogResult<Vec<Book>>;
    /// Inserts `book` and stores the assigned id back into it.
    async fn insert_book(&mut self, book: &mut Book) -> CatalogResult<()>;
    async fn update_book_modified_time(&mut self, book_id: i64, updated_at: DateTime<Utc>) -> CatalogResult<()>;
    async fn update_book_page_count(&mut self, book_id: i64, page_count: i64) -> CatalogResult<()>;
    async fn update_book_format(&mut self, book_id: i64, format: &str) -> CatalogResult<()>;
    async fn delete_book(&mut self, book_id: i64) -> CatalogResult<()>;

    async fn insert_page(&mut self, page: &Page) -> CatalogResult<()>;
    async fn delete_pages_by_book(&mut self, book_id: i64) -> CatalogResult<()>;
}
