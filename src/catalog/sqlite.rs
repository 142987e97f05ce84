use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::CatalogStore;
use crate::error::CatalogResult;
use crate::types::{Book, Page, Title, TitleFlags};

/// [`CatalogStore`] over a borrowed SQLite connection.
///
/// Pass `&mut *tx` of an open transaction to keep a whole reconciliation in
/// one unit of work.
pub struct SqliteCatalog<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteCatalog<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'c> CatalogStore for SqliteCatalog<'c> {
    async fn find_titles_by_library(&mut self, library_id: i64) -> CatalogResult<Vec<Title>> {
        let titles = sqlx::query_as::<_, Title>(
            r#"SELECT id, library_id, name, url, created_at, updated_at, cover_width, cover_height,
                      book_count, langs, uncensored, waifu2x, webp
               FROM titles WHERE library_id=?1 ORDER BY name ASC"#,
        )
        .bind(library_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(titles)
    }

    async fn insert_title(&mut self, title: &mut Title) -> CatalogResult<()> {
        let res = sqlx::query(
            r#"INSERT INTO titles (library_id, name, url, created_at, updated_at, cover_width, cover_height,
                                   book_count, langs, uncensored, waifu2x, webp)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
        )
        .bind(title.library_id)
        .bind(&title.name)
        .bind(&title.url)
        .bind(title.created_at)
        .bind(title.updated_at)
        .bind(title.cover_width)
        .bind(title.cover_height)
        .bind(title.book_count)
        .bind(&title.langs)
        .bind(title.uncensored)
        .bind(title.waifu2x)
        .bind(title.webp)
        .execute(&mut *self.conn)
        .await?;
        title.id = res.last_insert_rowid();
        Ok(())
    }

    async fn update_title_modified_time(&mut self, title_id: i64, updated_at: DateTime<Utc>) -> CatalogResult<()> {
        sqlx::query("UPDATE titles SET updated_at=?1 WHERE id=?2")
            .bind(updated_at)
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_title_cover_dimension(&mut self, title_id: i64, width: i64, height: i64) -> CatalogResult<()> {
        sqlx::query("UPDATE titles SET cover_width=?1, cover_height=?2 WHERE id=?3")
            .bind(width)
            .bind(height)
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_title_langs(&mut self, title_id: i64, langs: &str) -> CatalogResult<()> {
        sqlx::query("UPDATE titles SET langs=?1 WHERE id=?2")
            .bind(langs)
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_title_book_count(&mut self, title_id: i64, book_count: i64) -> CatalogResult<()> {
        sqlx::query("UPDATE titles SET book_count=?1 WHERE id=?2")
            .bind(book_count)
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_title_flags(&mut self, title_id: i64, flags: TitleFlags) -> CatalogResult<()> {
        sqlx::query("UPDATE titles SET uncensored=?1, waifu2x=?2, webp=?3 WHERE id=?4")
            .bind(flags.uncensored)
            .bind(flags.waifu2x)
            .bind(flags.webp)
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn delete_title(&mut self, title_id: i64) -> CatalogResult<()> {
        sqlx::query("DELETE FROM titles WHERE id=?1")
            .bind(title_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn find_books_by_title(&mut self, title_id: i64) -> CatalogResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"SELECT id, title_id, library_id, name, url, created_at, updated_at, page_count, format
               FROM books WHERE title_id=?1 ORDER BY name ASC"#,
        )
        .bind(title_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(books)
    }

    async fn insert_book(&mut self, book: &mut Book) -> CatalogResult<()> {
        let res = sqlx::query(
            r#"INSERT INTO books (title_id, library_id, name, url, created_at, updated_at, page_count, format)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(book.title_id)
        .bind(book.library_id)
        .bind(&book.name)
        .bind(&book.url)
        .bind(book.created_at)
        .bind(book.updated_at)
        .bind(book.page_count)
        .bind(&book.format)
        .execute(&mut *self.conn)
        .await?;
        book.id = res.last_insert_rowid();
        Ok(())
    }

    async fn update_book_modified_time(&mut self, book_id: i64, updated_at: DateTime<Utc>) -> CatalogResult<()> {
        sqlx::query("UPDATE books SET updated_at=?1 WHERE id=?2")
            .bind(updated_at)
            .bind(book_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_book_page_count(&mut self, book_id: i64, page_count: i64) -> CatalogResult<()> {
        sqlx::query("UPDATE books SET page_count=?1 WHERE id=?2")
            .bind(page_count)
            .bind(book_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn update_book_format(&mut self, book_id: i64, format: &str) -> CatalogResult<()> {
        sqlx::query("UPDATE books SET format=?1 WHERE id=?2")
            .bind(format)
            .bind(book_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn delete_book(&mut self, book_id: i64) -> CatalogResult<()> {
        sqlx::query("DELETE FROM books WHERE id=?1")
            .bind(book_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn insert_page(&mut self, page: &Page) -> CatalogResult<()> {
        sqlx::query(
            r#"INSERT INTO pages (book_id, file_index, number, width, height, favorite)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(page.book_id)
        .bind(page.index)
        .bind(page.number)
        .bind(page.width)
        .bind(page.height)
        .bind(page.favorite)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    async fn delete_pages_by_book(&mut self, book_id: i64) -> CatalogResult<()> {
        sqlx::query("DELETE FROM pages WHERE book_id=?1")
            .bind(book_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
