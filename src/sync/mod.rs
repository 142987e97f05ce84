//! Reconciliation of a [`ScanResult`] with the persisted catalog.
//!
//! Titles and books are matched by name, changes are detected by modification
//! time only. Page scans of new or changed books run on a bounded worker pool;
//! workers only read archives and decode images, every store write happens on
//! the task that called [`sync_library`].

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::catalog::CatalogStore;
use crate::error::{CatalogError, CatalogResult};
use crate::types::{Book, Page, ScanEvent, ScanResult, SyncSummary, Title};

#[derive(Debug)]
enum PageScanOutcome {
    /// Book unchanged, nothing was scanned.
    Unchanged,
    Scanned { book_id: i64, pages: Vec<Page> },
    Failed { book: String, error: CatalogError },
}

/// Dispatches page scans and keeps count of everything dispatched so the
/// drain knows exactly how many results to wait for.
struct PageScanPool {
    sem: Arc<Semaphore>,
    tx: mpsc::Sender<PageScanOutcome>,
    rx: mpsc::Receiver<PageScanOutcome>,
    cancel: CancellationToken,
    dispatched: usize,
}

impl PageScanPool {
    /// `capacity` must be at least the number of results that will be dispatched.
    fn new(capacity: usize, concurrency: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { sem: Arc::new(Semaphore::new(concurrency.max(1))), tx, rx, cancel, dispatched: 0 }
    }

    async fn skip(&mut self) {
        self.dispatched += 1;
        let _ = self.tx.send(PageScanOutcome::Unchanged).await;
    }

    fn schedule(&mut self, book_id: i64, book: &Book) {
        self.dispatched += 1;
        let sem = self.sem.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let name = book.name.clone();
        let path = PathBuf::from(&book.url);
        tokio::spawn(async move {
            let outcome = match sem.acquire_owned().await {
                Ok(_) if cancel.is_cancelled() => {
                    PageScanOutcome::Failed { book: name, error: CatalogError::Cancelled }
                }
                Ok(permit) => {
                    let worker_cancel = cancel.clone();
                    let joined = task::spawn_blocking(move || {
                        let _permit = permit;
                        archive::scan_book_pages(&path, book_id, &worker_cancel)
                    })
                    .await;
                    match joined {
                        Ok(Ok(pages)) => PageScanOutcome::Scanned { book_id, pages },
                        Ok(Err(error)) => PageScanOutcome::Failed { book: name, error },
                        Err(e) => PageScanOutcome::Failed { book: name, error: e.into() },
                    }
                }
                Err(_) => PageScanOutcome::Failed { book: name, error: CatalogError::Cancelled },
            };
            if matches!(outcome, PageScanOutcome::Failed { .. }) {
                // Not-yet-started scans are skipped from here on.
                cancel.cancel();
            }
            let _ = tx.send(outcome).await;
        });
    }

    /// Waits for every dispatched result and inserts scanned pages through
    /// `store`, one book at a time. Once an error is known nothing more is
    /// written, but the remaining results are still awaited.
    async fn drain<S>(
        self,
        store: &mut S,
        summary: &mut SyncSummary,
        mut first_error: Option<CatalogError>,
    ) -> Option<CatalogError>
    where
        S: CatalogStore + ?Sized,
    {
        let PageScanPool { tx, mut rx, cancel, dispatched, .. } = self;
        drop(tx);

        for _ in 0..dispatched {
            let Some(outcome) = rx.recv().await else { break };
            match outcome {
                PageScanOutcome::Unchanged => {}
                PageScanOutcome::Scanned { book_id, pages } => {
                    if first_error.is_some() {
                        continue;
                    }
                    for page in &pages {
                        if let Err(e) = store.insert_page(page).await {
                            cancel.cancel();
                            record_error(&mut first_error, e);
                            break;
                        }
                        summary.pages_inserted += 1;
                    }
                    tracing::debug!(book_id, pages = pages.len(), "inserted book pages");
                }
                PageScanOutcome::Failed { book, error } => {
                    if !matches!(error, CatalogError::Cancelled) {
                        tracing::error!(book = %book, "page scan failed: {}", error);
                    }
                    record_error(&mut first_error, error);
                }
            }
        }
        first_error
    }
}

/// Keeps the first real error; a cancellation only counts if nothing else failed.
fn record_error(slot: &mut Option<CatalogError>, error: CatalogError) {
    match slot {
        None => *slot = Some(error),
        Some(CatalogError::Cancelled) if !matches!(error, CatalogError::Cancelled) => *slot = Some(error),
        Some(_) => {}
    }
}

/// Applies `scan` to the catalog of `library_id` through `store`.
///
/// Every page scan that was dispatched is awaited before returning, even when
/// a store write or another scan failed; the first such error is returned and
/// the caller decides what happens to its unit of work.
pub async fn sync_library<S>(
    library_id: i64,
    mut scan: ScanResult,
    store: &mut S,
    concurrency: usize,
    events: &broadcast::Sender<ScanEvent>,
    cancel: &CancellationToken,
) -> CatalogResult<SyncSummary>
where
    S: CatalogStore + ?Sized,
{
    let cancel = cancel.child_token();
    let mut pool = PageScanPool::new(scan.book_total(), concurrency, cancel.clone());
    let mut summary = SyncSummary { warnings: scan.warnings, ..SyncSummary::default() };

    let applied = apply_diff(library_id, &mut scan, store, &mut pool, &mut summary, events).await;
    let mut first_error = None;
    if let Err(e) = applied {
        cancel.cancel();
        first_error = Some(e);
    }

    match pool.drain(store, &mut summary, first_error).await {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

async fn apply_diff<S>(
    library_id: i64,
    scan: &mut ScanResult,
    store: &mut S,
    pool: &mut PageScanPool,
    summary: &mut SyncSummary,
    events: &broadcast::Sender<ScanEvent>,
) -> CatalogResult<()>
where
    S: CatalogStore + ?Sized,
{
    let persisted: HashMap<String, Title> = store
        .find_titles_by_library(library_id)
        .await?
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();

    for (name, title) in &persisted {
        if scan.titles.contains_key(name) {
            continue;
        }
        summary.books_removed += remove_title(store, title).await?;
        summary.titles_removed += 1;
        tracing::info!(title = %name, "removed title no longer on disk");
        let _ = events.send(ScanEvent::TitleRemoved { name: name.clone() });
    }

    let mut names: Vec<String> = scan.titles.keys().cloned().collect();
    names.sort();

    for name in names {
        if pool.cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        let Some(mut title) = scan.titles.remove(&name) else { continue };
        let mut books = scan.books.remove(&name).unwrap_or_default();

        match persisted.get(&name) {
            None => {
                title.library_id = library_id;
                store.insert_title(&mut title).await?;
                for book in books.iter_mut() {
                    book.title_id = title.id;
                    book.library_id = library_id;
                    store.insert_book(book).await?;
                    pool.schedule(book.id, book);
                    summary.books_added += 1;
                }
                summary.titles_added += 1;
                tracing::info!(title = %name, books = books.len(), "added new title");
                let _ = events.send(ScanEvent::TitleAdded { name });
            }
            Some(existing) if existing.updated_at == title.updated_at => {
                for _ in &books {
                    pool.skip().await;
                }
            }
            Some(existing) => {
                update_title(library_id, existing, &title, &mut books, store, pool, summary).await?;
                summary.titles_updated += 1;
                tracing::info!(title = %name, "updated modified title");
                let _ = events.send(ScanEvent::TitleUpdated { name });
            }
        }
    }
    Ok(())
}

async fn update_title<S>(
    library_id: i64,
    existing: &Title,
    scanned: &Title,
    books: &mut [Book],
    store: &mut S,
    pool: &mut PageScanPool,
    summary: &mut SyncSummary,
) -> CatalogResult<()>
where
    S: CatalogStore + ?Sized,
{
    let id = existing.id;
    store.update_title_modified_time(id, scanned.updated_at).await?;
    if existing.cover_width != scanned.cover_width || existing.cover_height != scanned.cover_height {
        store.update_title_cover_dimension(id, scanned.cover_width, scanned.cover_height).await?;
    }
    if existing.langs != scanned.langs {
        store.update_title_langs(id, &scanned.langs).await?;
    }
    if existing.book_count != scanned.book_count {
        store.update_title_book_count(id, scanned.book_count).await?;
    }
    if existing.flags() != scanned.flags() {
        store.update_title_flags(id, scanned.flags()).await?;
    }

    let persisted_books = store.find_books_by_title(id).await?;
    let scanned_names: HashSet<&str> = books.iter().map(|b| b.name.as_str()).collect();
    for book in persisted_books.iter().filter(|b| !scanned_names.contains(b.name.as_str())) {
        store.delete_pages_by_book(book.id).await?;
        store.delete_book(book.id).await?;
        summary.books_removed += 1;
        tracing::debug!(title = %existing.name, book = %book.name, "removed book");
    }

    let persisted_by_name: HashMap<&str, &Book> =
        persisted_books.iter().map(|b| (b.name.as_str(), b)).collect();
    for book in books.iter_mut() {
        match persisted_by_name.get(book.name.as_str()) {
            Some(db_book) if db_book.updated_at == book.updated_at => pool.skip().await,
            Some(db_book) => {
                store.update_book_modified_time(db_book.id, book.updated_at).await?;
                if db_book.page_count != book.page_count {
                    store.update_book_page_count(db_book.id, book.page_count).await?;
                }
                if db_book.format != book.format {
                    store.update_book_format(db_book.id, &book.format).await?;
                }
                store.delete_pages_by_book(db_book.id).await?;
                pool.schedule(db_book.id, book);
                summary.books_updated += 1;
            }
            None => {
                book.title_id = id;
                book.library_id = library_id;
                store.insert_book(book).await?;
                pool.schedule(book.id, book);
                summary.books_added += 1;
            }
        }
    }
    Ok(())
}

/// Deletes a title together with its books and their pages. Returns the number
/// of books removed.
async fn remove_title<S>(store: &mut S, title: &Title) -> CatalogResult<u64>
where
    S: CatalogStore + ?Sized,
{
    let books = store.find_books_by_title(title.id).await?;
    for book in &books {
        store.delete_pages_by_book(book.id).await?;
        store.delete_book(book.id).await?;
    }
    store.delete_title(title.id).await?;
    Ok(books.len() as u64)
}
