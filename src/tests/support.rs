//! Fixtures shared by the test modules: real cbz archives, real images and
//! throwaway SQLite catalogs.

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::db;

pub fn image_bytes(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, image::ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, image::ImageFormat::Jpeg)
}

/// Writes a zip archive with the entries in the given (raw) order.
pub fn write_cbz(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, opts).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Sets the modification time of a file or directory to `secs` after the epoch.
pub fn touch(path: &Path, secs: u64) {
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    File::open(path).unwrap().set_modified(time).unwrap();
}

pub const ALPHA: &str = "Alpha {2020-01-15}";
pub const ALPHA_BOOK_1: &str = "[EN] Alpha 01 [Uncensored]";
pub const ALPHA_BOOK_2: &str = "Alpha 02";

/// A library with one title holding two books (3 + 5 pages) and a 120x180 cover.
///
/// Book 2's entries are stored out of name order.
pub fn sample_library() -> TempDir {
    let root = TempDir::new().unwrap();
    let title = root.path().join(ALPHA);
    fs::create_dir(&title).unwrap();
    fs::write(title.join("cover.jpg"), jpeg(120, 180)).unwrap();

    let book1 = title.join(format!("{}.cbz", ALPHA_BOOK_1));
    write_cbz(&book1, &[("001.png", png(10, 20)), ("002.png", png(11, 21)), ("003.png", png(12, 22))]);
    let book2 = title.join(format!("{}.cbz", ALPHA_BOOK_2));
    write_cbz(
        &book2,
        &[
            ("p05.png", png(50, 5)),
            ("p01.png", png(10, 1)),
            ("p03.png", png(30, 3)),
            ("p02.png", png(20, 2)),
            ("p04.png", png(40, 4)),
        ],
    );
    fs::write(title.join("notes.txt"), b"not a book").unwrap();

    touch(&book1, 1_600_000_000);
    touch(&book2, 1_600_000_100);
    touch(&title, 1_600_000_200);
    root
}

/// Adds a title folder with one single-page book, mtimes pinned to `secs`.
pub fn add_title(root: &Path, name: &str, book: &str, secs: u64) -> PathBuf {
    let title = root.join(name);
    fs::create_dir(&title).unwrap();
    let path = title.join(format!("{}.cbz", book));
    write_cbz(&path, &[("1.png", png(8, 8))]);
    touch(&path, secs);
    touch(&title, secs);
    title
}

/// A fresh file-backed catalog; keep the returned dir alive for the pool's lifetime.
pub async fn test_pool() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let pool = db::connect(&url, 4).await.unwrap();
    db::init_db(&pool).await.unwrap();
    (pool, dir)
}
