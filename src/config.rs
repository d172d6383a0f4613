use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::Policy;

/// Application-level constants
pub const APP_NAME: &str = "FarCheck";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_MAX_BODY_MB: usize = 220;
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_FILES_PER_INGEST: usize = 10;

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "farcheck_lib=info,tower_http=warn"
}

/// ~/FarCheck/ unless overridden. Falls back to the working directory
/// when no home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Chat-completions collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Azure-style deployment name; when set the endpoint is treated as a
    /// resource root and the deployment URL is derived from it.
    pub deployment: Option<String>,
    pub api_version: String,
    pub timeout_secs: u64,
}

/// Document-intelligence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct DiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub timeout_secs: u64,
}

/// Local OCR collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    pub command: String,
    pub skip_pdf: bool,
}

/// Process configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    /// `None` runs without the durable store.
    pub db_path: Option<PathBuf>,
    pub bind: SocketAddr,
    pub max_body_bytes: usize,
    pub llm: Option<LlmConfig>,
    pub di: Option<DiConfig>,
    pub ocr: OcrConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str, default: bool| match get(key).as_deref() {
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            _ => default,
        };
        let num = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let data_dir = get("FARCHECK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let upload_dir = get("FARCHECK_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads"));
        let db_path = if flag("FARCHECK_DISABLE_DB", false) {
            None
        } else {
            Some(
                get("FARCHECK_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("farcheck.db")),
            )
        };

        let bind = get("FARCHECK_BIND")
            .and_then(|v| v.parse().ok())
            .or_else(|| DEFAULT_BIND.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
        let max_body_bytes =
            num("FARCHECK_MAX_BODY_MB", DEFAULT_MAX_BODY_MB as u64) as usize * 1024 * 1024;

        let llm = match (get("LLM_ENDPOINT"), get("LLM_API_KEY")) {
            (Some(endpoint), Some(api_key)) => Some(LlmConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
                deployment: get("LLM_DEPLOYMENT"),
                api_version: get("LLM_API_VERSION").unwrap_or_else(|| "2024-06-01".into()),
                timeout_secs: num("LLM_TIMEOUT_SECS", 120),
            }),
            _ => None,
        };

        let di = match (get("DI_ENDPOINT"), get("DI_API_KEY")) {
            (Some(endpoint), Some(api_key)) => Some(DiConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
                api_version: get("DI_API_VERSION").unwrap_or_else(|| "2023-07-31".into()),
                // Polling faster than once a second is not allowed.
                poll_interval_ms: num("DI_POLL_INTERVAL_MS", 1000).max(1000),
                max_poll_attempts: num("DI_MAX_POLL_ATTEMPTS", 30) as u32,
                timeout_secs: num("DI_TIMEOUT_SECS", 60),
            }),
            _ => None,
        };

        let ocr = OcrConfig {
            command: get("TESSERACT_CMD").unwrap_or_else(|| "tesseract".into()),
            skip_pdf: flag("OCR_SKIP_PDF", true),
        };

        Self {
            data_dir,
            upload_dir,
            db_path,
            bind,
            max_body_bytes,
            llm,
            di,
            ocr,
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn gl_upload_dir(&self) -> PathBuf {
        self.upload_dir.join("gl")
    }

    pub fn docs_upload_dir(&self) -> PathBuf {
        self.upload_dir.join("docs")
    }
}

/// File-backed configuration blobs, used when the durable store is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub policy: Option<Policy>,
}

impl AppSettings {
    /// Load from disk; a missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Settings file is invalid, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
