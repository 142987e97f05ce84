//! Zip ("cbz") archive introspection.
//!
//! Archives do not guarantee any directory order, so pages are addressed by
//! their position in the *canonical order*: entries sorted byte-wise by their
//! full name. The order is recomputed every time it is requested; the page scan
//! and the page reader must agree exactly.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use crate::error::{CatalogError, CatalogResult};
use crate::types::Page;

/// Upper bound on the buffer reserved from an entry's declared size.
pub(crate) const MAX_PREALLOC: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the raw archive directory.
    pub index: usize,
    pub name: String,
}

impl ArchiveEntry {
    /// Lower-cased file extension of the entry, empty if there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PageBytes {
    pub data: Vec<u8>,
    pub extension: String,
}

/// An open archive. The file handle is released when this value is dropped.
pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive").field("path", &self.path).field("entries", &self.zip.len()).finish()
    }
}

impl Archive {
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let file = File::open(path).map_err(|e| {
            CatalogError::Io(format!("failed to open archive {}: {}", path.display(), e))
        })?;
        let zip = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            CatalogError::Io(format!("failed to read archive {}: {}", path.display(), e))
        })?;
        Ok(Self { path: path.to_path_buf(), zip })
    }

    pub fn entry_count(&self) -> usize {
        self.zip.len()
    }

    /// Entries sorted by name, byte-wise ascending.
    pub fn canonical_order(&mut self) -> CatalogResult<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.zip.len());
        for index in 0..self.zip.len() {
            let name = self.zip.by_index_raw(index)?.name().to_string();
            entries.push(ArchiveEntry { index, name });
        }
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        Ok(entries)
    }

    /// Reads the entry at `number` in canonical order.
    pub fn read_entry_at(&mut self, number: usize) -> CatalogResult<PageBytes> {
        let order = self.canonical_order()?;
        let entry = order.get(number).ok_or_else(|| {
            CatalogError::NotFound(format!(
                "page {} of {} ({} entries)",
                number,
                self.path.display(),
                order.len()
            ))
        })?;
        let data = self.read_raw(entry.index)?;
        Ok(PageBytes { data, extension: entry.extension() })
    }

    /// Lower-cased extension of the first canonical entry.
    pub fn format(&mut self) -> CatalogResult<String> {
        Ok(self.canonical_order()?.first().map(ArchiveEntry::extension).unwrap_or_default())
    }

    /// Decodes the dimensions of every page in canonical order.
    ///
    /// `cancel` is checked before each entry; a cancelled scan returns
    /// [`CatalogError::Cancelled`].
    pub fn scan_pages(&mut self, book_id: i64, cancel: &CancellationToken) -> CatalogResult<Vec<Page>> {
        let order = self.canonical_order()?;
        let mut pages = Vec::with_capacity(order.len());
        for (number, entry) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled);
            }
            let data = self.read_raw(entry.index)?;
            let (width, height) = decode_dimensions(Cursor::new(data)).map_err(|e| {
                CatalogError::Decode(format!("{} in {}: {}", entry.name, self.path.display(), e))
            })?;
            pages.push(Page {
                book_id,
                index: entry.index as i64,
                number: number as i64,
                width: i64::from(width),
                height: i64::from(height),
                favorite: false,
            });
        }
        Ok(pages)
    }

    fn read_raw(&mut self, index: usize) -> CatalogResult<Vec<u8>> {
        let mut file = self.zip.by_index(index)?;
        let mut data = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Buffer size to reserve for an entry declaring `declared` bytes.
///
/// The declared size comes from the zip header and is untrusted; `read_to_end`
/// still grows the buffer past the cap when the entry really is that large.
pub(crate) fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_PREALLOC)
}

/// Opens the book at `path` and decodes all of its pages.
pub fn scan_book_pages(path: &Path, book_id: i64, cancel: &CancellationToken) -> CatalogResult<Vec<Page>> {
    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled);
    }
    Archive::open(path)?.scan_pages(book_id, cancel)
}

/// Width and height of an image without decoding its pixels.
///
/// The format is sniffed from the content; PNG, JPEG and WEBP are supported.
pub fn decode_dimensions<R: BufRead + Seek>(reader: R) -> CatalogResult<(u32, u32)> {
    let reader = image::ImageReader::new(reader).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(CatalogError::Decode("unrecognized image format".to_string()));
    }
    Ok(reader.into_dimensions()?)
}

/// Dimensions of the image file at `path`.
pub fn image_file_dimensions(path: &Path) -> CatalogResult<(u32, u32)> {
    let file = File::open(path)
        .map_err(|e| CatalogError::Io(format!("failed to open {}: {}", path.display(), e)))?;
    decode_dimensions(BufReader::new(file))
}
