use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use chrono::{DateTime, SubsecRound, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task;
use walkdir::WalkDir;

use crate::archive::{self, Archive};
use crate::error::{CatalogError, CatalogResult};
use crate::naming;
use crate::types::{Book, ScanEvent, ScanOptions, ScanResult, Title};

#[derive(Debug, Clone)]
struct TitleFolder {
    name: String,
    path: PathBuf,
    modified: DateTime<Utc>,
}

/// Walks one library root and derives every title and book below it.
///
/// Only the root listing can fail; per-title problems (missing cover,
/// unreadable folder or archive) are reported as [`ScanEvent::Warning`] and
/// the affected entity is left out or keeps zero cover dimensions.
pub async fn scan_library_root(
    root: &Path,
    options: &ScanOptions,
    events: &broadcast::Sender<ScanEvent>,
) -> CatalogResult<ScanResult> {
    let excludes = build_globset(&options.excludes)?;
    let root_buf = root.to_path_buf();
    let folders = task::spawn_blocking(move || list_title_folders(&root_buf, &excludes)).await??;

    let mut titles: HashMap<String, Title> = HashMap::with_capacity(folders.len());
    for folder in &folders {
        let created_at = naming::parse_created_at(&folder.name).unwrap_or(folder.modified);
        titles.insert(
            folder.name.clone(),
            Title {
                id: 0,
                library_id: 0,
                name: folder.name.clone(),
                url: folder.path.to_string_lossy().to_string(),
                created_at,
                updated_at: folder.modified,
                cover_width: 0,
                cover_height: 0,
                book_count: 0,
                langs: String::new(),
                uncensored: false,
                waifu2x: false,
                webp: false,
            },
        );
    }

    let sem = Arc::new(Semaphore::new(options.worker_count()));
    let mut warnings = 0u64;

    // One task per title for the cover, one per title for its books.
    let cover_name = options.cover_file_name.clone();
    let mut covers = fan_out(&folders, &sem, move |folder| {
        archive::image_file_dimensions(&folder.path.join(&cover_name))
    });
    let extension = options.book_extension.clone();
    let mut listings = fan_out(&folders, &sem, move |folder| scan_title_folder(&folder.path, &extension));

    for _ in 0..folders.len() {
        let Some((name, res)) = covers.recv().await else { break };
        match res {
            Ok((width, height)) => {
                if let Some(title) = titles.get_mut(&name) {
                    title.cover_width = i64::from(width);
                    title.cover_height = i64::from(height);
                }
            }
            Err(e) => {
                warnings += 1;
                warn(events, &name, "cover unreadable", &e);
            }
        }
    }

    let mut books: HashMap<String, Vec<Book>> = HashMap::with_capacity(folders.len());
    for _ in 0..folders.len() {
        let Some((name, res)) = listings.recv().await else { break };
        match res {
            Ok((title_books, failures)) => {
                for (path, e) in failures {
                    warnings += 1;
                    warn(events, &path, "book skipped", &e);
                }
                books.insert(name, title_books);
            }
            Err(e) => {
                warnings += 1;
                warn(events, &name, "title folder unreadable", &e);
                titles.remove(&name);
            }
        }
    }

    // Titles whose listing never came back are dropped rather than exposed half-built.
    titles.retain(|name, _| books.contains_key(name));

    for (name, title) in titles.iter_mut() {
        let title_books = books.get(name).map(Vec::as_slice).unwrap_or_default();
        title.book_count = title_books.len() as i64;
        let flags = naming::aggregate_flags(title_books.iter().map(|b| b.name.as_str()));
        title.uncensored = flags.uncensored;
        title.waifu2x = flags.waifu2x;
        title.webp = title_books.iter().any(|b| b.format == "webp");
        title.langs =
            naming::join_langs(title_books.iter().map(|b| b.name.as_str()), &options.default_lang);
    }

    tracing::info!(
        root = %root.display(),
        titles = titles.len(),
        books = books.values().map(Vec::len).sum::<usize>(),
        warnings,
        "scanned library root"
    );

    Ok(ScanResult { titles, books, warnings })
}

/// Spawns one blocking task per folder, bounded by `sem`, and returns the
/// receiving end of a channel sized to the number of folders. Results carry
/// the title name; arrival order is meaningless.
fn fan_out<T, F>(
    folders: &[TitleFolder],
    sem: &Arc<Semaphore>,
    work: F,
) -> mpsc::Receiver<(String, CatalogResult<T>)>
where
    T: Send + 'static,
    F: Fn(&TitleFolder) -> CatalogResult<T> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(folders.len().max(1));
    let work = Arc::new(work);
    for folder in folders {
        let tx = tx.clone();
        let sem = sem.clone();
        let work = work.clone();
        let folder = folder.clone();
        tokio::spawn(async move {
            let name = folder.name.clone();
            let res = match sem.acquire_owned().await {
                Ok(permit) => {
                    let joined = task::spawn_blocking(move || {
                        let _permit = permit;
                        work(&folder)
                    })
                    .await;
                    joined.unwrap_or_else(|e| Err(e.into()))
                }
                Err(_) => Err(CatalogError::Cancelled),
            };
            let _ = tx.send((name, res)).await;
        });
    }
    rx
}

fn list_title_folders(root: &Path, excludes: &GlobSet) -> CatalogResult<Vec<TitleFolder>> {
    let rd = fs::read_dir(root).map_err(|e| {
        CatalogError::Io(format!("failed to read library root {}: {}", root.display(), e))
    })?;
    let mut folders = Vec::new();
    for entry in rd.flatten() {
        let path = entry.path();
        let md = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to stat title folder: {}", e);
                continue;
            }
        };
        if !md.is_dir() || matches_excludes(&path, excludes) {
            continue;
        }
        folders.push(TitleFolder {
            name: entry.file_name().to_string_lossy().to_string(),
            path,
            modified: modified_time(md.modified().ok()),
        });
    }
    Ok(folders)
}

type BookFailures = Vec<(String, CatalogError)>;

/// Lists the book archives directly inside one title folder.
fn scan_title_folder(folder: &Path, extension: &str) -> CatalogResult<(Vec<Book>, BookFailures)> {
    // Surface an unreadable folder as an error instead of an empty listing.
    fs::read_dir(folder).map_err(|e| {
        CatalogError::Io(format!("failed to read title folder {}: {}", folder.display(), e))
    })?;

    let mut books = Vec::new();
    let mut failures = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                failures.push((path, CatalogError::Io(e.to_string())));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        match scan_book_file(path) {
            Ok(book) => books.push(book),
            Err(e) => failures.push((path.display().to_string(), e)),
        }
    }
    Ok((books, failures))
}

fn scan_book_file(path: &Path) -> CatalogResult<Book> {
    let md = fs::metadata(path)?;
    let modified = modified_time(md.modified().ok());
    let mut archive = Archive::open(path)?;
    let page_count = archive.entry_count() as i64;
    let format = archive.format()?;
    let name = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

    Ok(Book {
        id: 0,
        title_id: 0,
        library_id: 0,
        name,
        url: path.to_string_lossy().to_string(),
        created_at: modified,
        updated_at: modified,
        page_count,
        format,
    })
}

/// Modification time in UTC, truncated to whole seconds so it survives a
/// round trip through the catalog unchanged.
fn modified_time(time: Option<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_default().trunc_subsecs(0)
}

fn build_globset(patterns: &[String]) -> CatalogResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Normalisiere Backslashes zu Slashes, damit Muster plattformunabhängig passen.
        let norm = p.trim().replace('\\', "/");
        let g = Glob::new(&norm)
            .map_err(|e| CatalogError::InvalidInput(format!("Invalid exclude pattern: {} ({})", p, e)))?;
        b.add(g);
    }
    b.build().map_err(|e| CatalogError::InvalidInput(format!("Invalid exclude patterns: {}", e)))
}

fn matches_excludes(path: &Path, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    let s = path.to_string_lossy().replace('\\', "/");
    set.is_match(&s)
}

fn warn(events: &broadcast::Sender<ScanEvent>, path: &str, context: &str, err: &CatalogError) {
    let code = err.code();
    tracing::warn!(path, code, "{}: {}", context, err);
    let _ = events.send(ScanEvent::Warning {
        path: path.to_string(),
        code: code.to_string(),
        message: format!("{}: {}", context, err),
    });
}
