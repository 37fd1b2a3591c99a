//! Shared handler state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags};

use crate::api::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
        }
    }

    /// Runs `f` against a fresh read-only connection on the blocking pool.
    /// Failures become `ApiError::Internal` with `Failed to <operation>: <error>`
    /// as detail.
    pub async fn read<T, F>(&self, operation: &'static str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.db_path);
        let joined = tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            f(&conn)
        })
        .await;

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ApiError::Internal(format!("Failed to {}: {}", operation, e))),
            Err(e) => Err(ApiError::Internal(format!("Failed to {}: {}", operation, e))),
        }
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}
