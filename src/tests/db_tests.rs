#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::catalog::{CatalogStore, SqliteCatalog};
    use crate::db;
    use crate::tests::support::test_pool;
    use crate::types::{Book, Page, Title, TitleFlags};

    async fn insert_library(pool: &sqlx::SqlitePool) -> i64 {
        sqlx::query("INSERT INTO libraries (name, root) VALUES ('L', '/lib')")
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn title(library_id: i64, name: &str) -> Title {
        let t = Utc.with_ymd_and_hms(2022, 5, 6, 7, 8, 9).unwrap();
        Title {
            id: 0,
            library_id,
            name: name.to_string(),
            url: format!("/lib/{}", name),
            created_at: t,
            updated_at: t,
            cover_width: 100,
            cover_height: 150,
            book_count: 1,
            langs: "jp".to_string(),
            uncensored: false,
            waifu2x: true,
            webp: false,
        }
    }

    fn book(title: &Title, name: &str) -> Book {
        Book {
            id: 0,
            title_id: title.id,
            library_id: title.library_id,
            name: name.to_string(),
            url: format!("{}/{}.cbz", title.url, name),
            created_at: title.created_at,
            updated_at: title.updated_at,
            page_count: 2,
            format: "png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_init_db() {
        let (pool, _dir) = test_pool().await;
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();

        for t in ["books", "libraries", "pages", "titles"] {
            assert!(tables.contains(&t.to_string()), "missing table {}", t);
        }
        // Idempotent
        db::init_db(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn store_round_trip() {
        let (pool, _dir) = test_pool().await;
        let lib = insert_library(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut store = SqliteCatalog::new(&mut *conn);

        let mut t = title(lib, "Alpha");
        store.insert_title(&mut t).await.unwrap();
        assert!(t.id > 0);
        let mut b = book(&t, "Vol 1");
        store.insert_book(&mut b).await.unwrap();
        assert!(b.id > 0);
        for number in 0..2 {
            let page = Page { book_id: b.id, index: 1 - number, number, width: 10, height: 20, favorite: false };
            store.insert_page(&page).await.unwrap();
        }

        let titles = store.find_titles_by_library(lib).await.unwrap();
        assert_eq!(titles, vec![t.clone()]);
        let books = store.find_books_by_title(t.id).await.unwrap();
        assert_eq!(books, vec![b.clone()]);

        let later = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        store.update_title_modified_time(t.id, later).await.unwrap();
        store.update_title_cover_dimension(t.id, 1, 2).await.unwrap();
        store.update_title_langs(t.id, "EN,jp").await.unwrap();
        store.update_title_book_count(t.id, 3).await.unwrap();
        store
            .update_title_flags(t.id, TitleFlags { uncensored: true, waifu2x: false, webp: true })
            .await
            .unwrap();
        store.update_book_modified_time(b.id, later).await.unwrap();
        store.update_book_page_count(b.id, 9).await.unwrap();
        store.update_book_format(b.id, "webp").await.unwrap();

        let t2 = &store.find_titles_by_library(lib).await.unwrap()[0];
        assert_eq!(t2.updated_at, later);
        assert_eq!(t2.created_at, t.created_at);
        assert_eq!((t2.cover_width, t2.cover_height), (1, 2));
        assert_eq!(t2.langs, "EN,jp");
        assert_eq!(t2.book_count, 3);
        assert_eq!(t2.flags(), TitleFlags { uncensored: true, waifu2x: false, webp: true });
        let b2 = &store.find_books_by_title(t.id).await.unwrap()[0];
        assert_eq!((b2.updated_at, b2.page_count, b2.format.as_str()), (later, 9, "webp"));

        store.delete_pages_by_book(b.id).await.unwrap();
        store.delete_book(b.id).await.unwrap();
        store.delete_title(t.id).await.unwrap();
        assert!(store.find_titles_by_library(lib).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_title_name_is_rejected() {
        let (pool, _dir) = test_pool().await;
        let lib = insert_library(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut store = SqliteCatalog::new(&mut *conn);

        store.insert_title(&mut title(lib, "Alpha")).await.unwrap();
        let err = store.insert_title(&mut title(lib, "Alpha")).await.unwrap_err();
        assert!(matches!(err, crate::error::CatalogError::Persistence(_)));
    }

    #[tokio::test]
    async fn foreign_keys_cascade() {
        let (pool, _dir) = test_pool().await;
        let lib = insert_library(&pool).await;
        {
            let mut conn = pool.acquire().await.unwrap();
            let mut store = SqliteCatalog::new(&mut *conn);
            let mut t = title(lib, "Alpha");
            store.insert_title(&mut t).await.unwrap();
            let mut b = book(&t, "Vol 1");
            store.insert_book(&mut b).await.unwrap();
            store.insert_page(&Page { book_id: b.id, index: 0, number: 0, width: 1, height: 1, favorite: false }).await.unwrap();
        }

        sqlx::query("DELETE FROM libraries WHERE id=?1").bind(lib).execute(&pool).await.unwrap();
        let pages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages").fetch_one(&pool).await.unwrap();
        let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&pool).await.unwrap();
        assert_eq!((pages, books), (0, 0));
    }

    #[tokio::test]
    async fn init_adds_favorite_to_existing_pages_table() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("old.db").display());
        let pool = db::connect(&url, 2).await.unwrap();
        sqlx::query(
            r#"CREATE TABLE pages (
                book_id INTEGER NOT NULL,
                file_index INTEGER NOT NULL,
                number INTEGER NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                PRIMARY KEY(book_id, number)
            )"#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO pages VALUES (1, 0, 0, 5, 6)").execute(&pool).await.unwrap();

        db::init_db(&pool).await.unwrap();
        db::init_db(&pool).await.unwrap();
        let page = sqlx::query_as::<_, Page>(
            "SELECT book_id, file_index, number, width, height, favorite FROM pages",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((page.width, page.height, page.favorite), (5, 6, false));
    }
}
