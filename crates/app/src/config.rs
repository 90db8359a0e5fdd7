use std::path::{Path, PathBuf};
use std::time::Duration;

use quiz_core::model::UserId;
use services::{HttpRemoteConfig, RetryPolicy};

pub const DEFAULT_DB_URL: &str = "sqlite://quiz.sqlite3";
pub const DEFAULT_QUESTIONS: &str = "questions.json";

/// Runtime settings, read from the environment (and `.env`) and then
/// overridden by command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub questions_path: PathBuf,
    pub user_id: UserId,
    pub remote: Option<HttpRemoteConfig>,
    pub submit_attempts: u32,
    pub rust_log: String,
}

impl Config {
    /// Load `.env` if present, then read `QUIZ_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_url = lookup("QUIZ_DB_URL")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let questions_path = lookup("QUIZ_QUESTIONS")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_QUESTIONS), PathBuf::from);
        let user_id = lookup("QUIZ_USER_ID")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let remote = lookup("QUIZ_REMOTE_URL")
            .filter(|value| !value.trim().is_empty())
            .map(|url| {
                let mut remote = HttpRemoteConfig::new(url);
                remote.api_key = lookup("QUIZ_REMOTE_API_KEY").filter(|key| !key.trim().is_empty());
                if let Some(secs) = lookup("QUIZ_REMOTE_TIMEOUT_SECS")
                    .and_then(|value| value.trim().parse::<u64>().ok())
                {
                    remote.timeout = Duration::from_secs(secs);
                }
                remote
            });
        let submit_attempts = lookup("QUIZ_SUBMIT_ATTEMPTS")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|attempts| *attempts > 0)
            .unwrap_or(RetryPolicy::default().max_attempts);
        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Self {
            db_url,
            questions_path,
            user_id,
            remote,
            submit_attempts,
            rust_log,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.submit_attempts)
    }
}

/// Turn a bare path or `sqlite:` URL into an absolute `sqlite://` URL.
pub fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file (and parent directories) so `SQLite` can open it.
///
/// # Errors
///
/// Returns an error if the URL has no file path or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
        .filter(|path| !path.is_empty())
        .ok_or_else(|| format!("invalid database url: {db_url}"))?;

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}
