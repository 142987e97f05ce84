use std::path::Path;

use serde::Deserialize;

use crate::types::ScanOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    pub cover_file_name: String,
    pub book_extension: String,
    pub default_lang: String,
    #[serde(default)]
    pub excludes: Vec<String>,
    pub concurrency: Option<usize>,
    /// Re-sync every library on this interval; a single pass when unset.
    pub rescan_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,
}

impl AppConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            cover_file_name: self.scanner.cover_file_name.clone(),
            book_extension: self.scanner.book_extension.clone(),
            default_lang: self.scanner.default_lang.clone(),
            excludes: self.scanner.excludes.clone(),
            concurrency: self.scanner.concurrency,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: comicvault.toml (in CWD)
        .add_source(::config::File::with_name("comicvault").required(false));

    if let Ok(custom_path) = std::env::var("COMICVAULT_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("COMICVAULT").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.database.url.trim().is_empty() {
        return Err(anyhow::anyhow!("database.url must not be empty"));
    }
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }
    if cfg.logging.file_name.trim().is_empty() {
        return Err(anyhow::anyhow!("logging.file_name must not be empty"));
    }

    // Scanner
    if cfg.scanner.cover_file_name.trim().is_empty() {
        return Err(anyhow::anyhow!("scanner.cover_file_name must not be empty"));
    }
    if cfg.scanner.book_extension.trim().is_empty() {
        return Err(anyhow::anyhow!("scanner.book_extension must not be empty"));
    }
    if cfg.scanner.default_lang.trim().is_empty() {
        return Err(anyhow::anyhow!("scanner.default_lang must not be empty"));
    }
    if let Some(c) = cfg.scanner.concurrency {
        if c == 0 || c > 256 {
            return Err(anyhow::anyhow!("scanner.concurrency must be in 1..=256"));
        }
    }
    if cfg.scanner.rescan_interval_secs == Some(0) {
        return Err(anyhow::anyhow!("scanner.rescan_interval_secs must be > 0 when set"));
    }

    for lib in &cfg.libraries {
        if lib.name.trim().is_empty() {
            return Err(anyhow::anyhow!("library name must not be empty (root {})", lib.root));
        }
        if lib.root.trim().is_empty() {
            return Err(anyhow::anyhow!("library {} has an empty root", lib.name));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
