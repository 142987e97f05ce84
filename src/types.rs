use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub root: String,
    pub created_at: DateTime<Utc>,
}

/// A series backed by one folder below a library root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Title {
    pub id: i64,
    pub library_id: i64,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cover_width: i64,
    pub cover_height: i64,
    pub book_count: i64,
    pub langs: String,
    pub uncensored: bool,
    pub waifu2x: bool,
    pub webp: bool,
}

impl Title {
    pub fn flags(&self) -> TitleFlags {
        TitleFlags { uncensored: self.uncensored, waifu2x: self.waifu2x, webp: self.webp }
    }
}

/// Boolean content flags aggregated over every book of a title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFlags {
    pub uncensored: bool,
    pub waifu2x: bool,
    pub webp: bool,
}

impl TitleFlags {
    pub fn merge(self, other: TitleFlags) -> TitleFlags {
        TitleFlags {
            uncensored: self.uncensored || other.uncensored,
            waifu2x: self.waifu2x || other.waifu2x,
            webp: self.webp || other.webp,
        }
    }
}

/// One cbz archive inside a title folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title_id: i64,
    pub library_id: i64,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub page_count: i64,
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub book_id: i64,
    /// Position of the entry in the raw archive directory.
    #[sqlx(rename = "file_index")]
    pub index: i64,
    /// Position in canonical (name-sorted) order.
    pub number: i64,
    pub width: i64,
    pub height: i64,
    /// User mark. Pages are rewritten when their book changes, which clears it.
    #[sqlx(default)]
    #[serde(default)]
    pub favorite: bool,
}

/// Default number of titles per search page.
pub const DEFAULT_TITLE_PAGE_SIZE: u32 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSort {
    /// Name ascending.
    #[default]
    Name,
    /// Newest first.
    CreatedAt,
}

/// Filter, order and paging of a title search.
///
/// An empty `library_ids` matches every library; an empty or absent `search`
/// matches every name. `page` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleQuery {
    pub library_ids: Vec<i64>,
    pub search: Option<String>,
    pub sort: TitleSort,
    pub page: u32,
    pub size: u32,
}

impl Default for TitleQuery {
    fn default() -> Self {
        Self {
            library_ids: vec![],
            search: None,
            sort: TitleSort::default(),
            page: 0,
            size: DEFAULT_TITLE_PAGE_SIZE,
        }
    }
}

/// Transient output of walking a library root. Ids are unset (0).
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub titles: HashMap<String, Title>,
    pub books: HashMap<String, Vec<Book>>,
    /// Recoverable problems met while scanning.
    pub warnings: u64,
}

impl ScanResult {
    pub fn book_total(&self) -> usize {
        self.books.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    pub cover_file_name: String,
    pub book_extension: String,
    pub default_lang: String,
    pub excludes: Vec<String>,
    pub concurrency: Option<usize>,
}

impl ScanOptions {
    /// Worker pool size for the per-title and per-book fan-outs.
    pub fn worker_count(&self) -> usize {
        self.concurrency.unwrap_or_else(|| (num_cpus::get() * 3 / 4).max(2)).max(1)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            cover_file_name: "cover.jpg".to_string(),
            book_extension: "cbz".to_string(),
            default_lang: "jp".to_string(),
            excludes: vec![],
            concurrency: None,
        }
    }
}

/// Counts of the mutations one reconciliation pass issued.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub titles_added: u64,
    pub titles_updated: u64,
    pub titles_removed: u64,
    pub books_added: u64,
    pub books_updated: u64,
    pub books_removed: u64,
    pub pages_inserted: u64,
    pub warnings: u64,
}

impl SyncSummary {
    pub fn mutation_count(&self) -> u64 {
        self.titles_added
            + self.titles_updated
            + self.titles_removed
            + self.books_added
            + self.books_updated
            + self.books_removed
            + self.pages_inserted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        library_id: i64,
        root: String,
    },
    Scanned {
        titles: usize,
        books: usize,
    },
    TitleAdded {
        name: String,
    },
    TitleUpdated {
        name: String,
    },
    TitleRemoved {
        name: String,
    },
    Warning {
        path: String,
        code: String,
        message: String,
    },
    Done {
        summary: SyncSummary,
    },
    Cancelled,
    Failed {
        message: String,
    },
}
