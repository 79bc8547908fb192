//! # Configuration
//!
//! Optional `avotrace.toml`, read once at startup.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! admins = ["maria"]
//! documents_dir = "/var/lib/avotrace/documents"
//!
//! [lifecycle]
//! archive_on_complete = true
//! delete_after_archive = false
//!
//! [payroll]
//! regular_minutes_per_day = 480
//! overtime_percent = 150
//!
//! [quality]
//! max_defect_permille = 50
//! min_dry_matter_permille = 210
//!
//! [remote]
//! url = "https://hub.example.com"
//! api_key = "..."
//! conflict_policy = "remote_wins"
//! ```
//!
//! A missing file means defaults. `AVOTRACE_REMOTE_URL` overrides
//! `remote.url`; the other `AVOTRACE_*` variables are read by the API
//! middleware.

use avotrace_core::{
    ConflictPolicy, LifecycleConfig, PayrollPolicy, QualityPolicy, TraceError, UserId, Viewer,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "avotrace.toml";

/// Environment variable overriding `remote.url`.
pub const REMOTE_URL_ENV: &str = "AVOTRACE_REMOTE_URL";

/// Largest configuration file read (1 MB).
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Users who see restricted lots of every owner.
    pub admins: Vec<String>,
    /// Where uploaded files are kept. Defaults to `<database>.documents`.
    pub documents_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            admins: Vec::new(),
            documents_dir: None,
        }
    }
}

/// `[remote]`: the shared server offline clients sync with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub conflict_policy: ConflictPolicy,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub lifecycle: LifecycleConfig,
    pub payroll: PayrollPolicy,
    pub quality: QualityPolicy,
    pub remote: RemoteConfig,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Read `path`, or return defaults if it does not exist.
    /// Environment overrides are applied afterwards.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let mut config = if path.exists() {
            let size = std::fs::metadata(path)
                .map_err(|e| TraceError::IoError(format!("Cannot read config metadata: {}", e)))?
                .len();
            if size > MAX_CONFIG_SIZE {
                return Err(TraceError::InvalidInput(format!(
                    "Config file {} is {} bytes, maximum is {}",
                    path.display(),
                    size,
                    MAX_CONFIG_SIZE
                )));
            }
            let text = std::fs::read_to_string(path)
                .map_err(|e| TraceError::IoError(format!("Read config: {}", e)))?;
            let config = Self::parse(&text)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            config
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse TOML text. Unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, TraceError> {
        toml::from_str(text)
            .map_err(|e| TraceError::InvalidInput(format!("Invalid configuration: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Some(url) = std::env::var(REMOTE_URL_ENV).ok().filter(|u| !u.is_empty()) {
            self.remote.url = Some(url);
        }
    }

    /// Whether `user` is listed in `server.admins`.
    pub fn is_admin(&self, user: &UserId) -> bool {
        self.server.admins.iter().any(|a| a == user.as_str())
    }

    /// The viewer for `user`, admin if listed.
    pub fn viewer(&self, user: UserId) -> Viewer {
        if self.is_admin(&user) {
            Viewer::admin(user)
        } else {
            Viewer::user(user)
        }
    }

    /// Directory for uploaded files next to `database`, unless configured.
    pub fn documents_dir(&self, database: &Path) -> PathBuf {
        self.server.documents_dir.clone().unwrap_or_else(|| {
            let mut name = database.as_os_str().to_os_string();
            name.push(".documents");
            PathBuf::from(name)
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
