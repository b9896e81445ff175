//! # Vigil Storage - Turso
//!
//! Turso/libSQL relational backend for the Vigil pipeline.
//!
//! This crate provides:
//! - Connection management for Turso databases (remote or local file)
//! - SQL schema creation
//! - CRUD for cameras, detections, and events
//! - N+1-safe bulk detection fetching
//! - Write-only collection accessors
//! - [`CascadeSoftDeleteService`] for tombstone/restore across the
//!   camera → event → detection hierarchy
//!
//! ## Example
//!
//! ```no_run
//! use vigil_storage_turso::TursoStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = TursoStorage::new("file:vigil.db", "").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::info;
use vigil_core::{Error, Result};

mod backend;
mod batch_fetch;
mod cameras;
mod cascade;
mod context_queries;
mod detections;
mod events;
mod rows;
mod schema;
mod write_only;

pub use cascade::{CascadeOutcome, CascadeSoftDeleteService};

/// Turso storage backend for the camera / detection / event hierarchy
pub struct TursoStorage {
    db: Arc<Database>,
}

impl TursoStorage {
    /// Create a new Turso storage instance
    ///
    /// # Arguments
    ///
    /// * `url` - Database URL (`libsql://` remote, `file:` local, or `:memory:`)
    /// * `token` - Authentication token (required for `libsql://`, empty otherwise)
    pub async fn new(url: &str, token: &str) -> Result<Self> {
        info!("connecting to Turso database at {}", url);

        if !url.starts_with("libsql://") && !url.starts_with("file:") && url != ":memory:" {
            return Err(Error::InvalidInput(format!(
                "unsupported database URL: {url}. Only libsql://, file:, or :memory: are allowed"
            )));
        }
        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::InvalidInput(
                "authentication token required for remote Turso connections".to_string(),
            ));
        }

        let db = if url.starts_with("libsql://") {
            Builder::new_remote(url.to_string(), token.to_string())
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to connect to Turso: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open local database: {e}")))?
        };

        info!("successfully connected to Turso database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create a storage instance from an existing database handle
    ///
    /// Useful for tests with local file databases.
    pub fn from_database(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Create all tables and indexes
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        for statement in schema::ALL_STATEMENTS {
            conn.execute(statement, ())
                .await
                .map_err(|e| Error::Storage(format!("schema initialization failed: {e}")))?;
        }
        info!("database schema initialized");
        Ok(())
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::Storage(format!("failed to get connection: {e}")))
    }
}

/// Run statements inside a transaction, rolling back on error
pub(crate) async fn with_transaction<F, T>(conn: &Connection, work: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
    F: Sized,
{
    conn.execute("BEGIN IMMEDIATE", ())
        .await
        .map_err(|e| Error::Storage(format!("failed to begin transaction: {e}")))?;
    match work.await {
        Ok(value) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|e| Error::Storage(format!("failed to commit transaction: {e}")))?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}
