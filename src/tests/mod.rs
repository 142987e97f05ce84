//! Tests for the catalog.
//!
//! - **naming_tests**: folder and file name grammar
//! - **archive_tests**: canonical order, page reads and dimension decoding
//! - **scanner_tests**: walking a library root into a scan result
//! - **sync_tests**: reconciliation against a real and a failing store
//! - **library_tests**: library management, transactional scans and page access
//! - **state_tests**: job tracking and metrics
//! - **error_tests**, **config_tests**, **db_tests**

pub mod support;

pub mod db_tests;
pub mod error_tests;
pub mod state_tests;
