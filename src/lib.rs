//! # ComicVault
//!
//! Keeps a SQLite catalog of comic/manga libraries in sync with the file
//! system. A library is a root directory; every folder below it is a title and
//! every `.cbz` archive inside a title folder is a book.
//!
//! ## Core Components
//!
//! - [`archive`]: zip access, canonical page order and image dimensions
//! - [`naming`]: metadata encoded in title and book names
//! - [`scanner`]: walks a library root into a [`types::ScanResult`]
//! - [`sync`]: reconciles a scan result with the persisted catalog
//! - [`catalog`]: the store seam used by the reconciliation and its SQLite implementation
//! - [`library`]: library management, transactional scans and page access
//! - [`state`]: running syncs, metrics and configuration shared by the binary
//! - [`config`], [`db`], [`error`], [`metrics`], [`types`]

pub mod archive;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod metrics;
pub mod naming;
pub mod scanner;
pub mod state;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;
