//! Durable embedding cache backed by SQLite
//!
//! Keyed by content hash and model identifier, not by query
//! fingerprint: the same text embedded under different queries shares
//! one stored vector. Vectors are stored as little-endian f32 blobs.

use crate::error::{EngineError, Result};
use crate::fingerprint::ContentHash;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

const MIGRATIONS: &[&str] = &["
    CREATE TABLE IF NOT EXISTS embeddings (
        content_hash TEXT NOT NULL,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        vector BLOB NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (content_hash, model)
    );
"];

/// SQLite-backed tier-3 embedding cache
pub struct SqliteEmbeddingCache {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteEmbeddingCache {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Io {
                source: e,
                context: format!("Failed to create embedding cache directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                EngineError::InternalCacheError(format!("Failed to create connection pool: {}", e))
            })?;

        {
            let conn = pool.get().map_err(|e| {
                EngineError::InternalCacheError(format!("Failed to get connection: {}", e))
            })?;

            // WAL for concurrent readers alongside the writer
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
            .map_err(sql_error)?;

            for migration in MIGRATIONS {
                conn.execute_batch(migration).map_err(sql_error)?;
            }
        }

        Ok(Self { pool })
    }

    /// Fetch a stored vector, if present
    pub fn get(&self, hash: &ContentHash, model: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;

        let row: Option<(usize, Vec<u8>)> = conn
            .query_row(
                "SELECT dimension, vector FROM embeddings
                 WHERE content_hash = ?1 AND model = ?2",
                params![hash.to_hex(), model],
                |row| Ok((row.get::<_, i64>(0)? as usize, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_error(other)),
            })?;

        match row {
            Some((dimension, bytes)) => {
                let vector = decode_vector(&bytes);
                if vector.len() != dimension {
                    return Err(EngineError::InternalCacheError(format!(
                        "stored vector dimension mismatch: expected {}, got {}",
                        dimension,
                        vector.len()
                    )));
                }
                Ok(Some(vector))
            }
            None => Ok(None),
        }
    }

    /// Store a vector, replacing any prior entry for the same key
    pub fn put(&self, hash: &ContentHash, model: &str, vector: &[f32]) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR REPLACE INTO embeddings (content_hash, model, dimension, vector)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                hash.to_hex(),
                model,
                vector.len() as i64,
                encode_vector(vector)
            ],
        )
        .map_err(sql_error)?;

        Ok(())
    }

    /// Number of stored vectors
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(sql_error)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            EngineError::InternalCacheError(format!("Failed to get connection: {}", e))
        })
    }
}

fn sql_error(e: rusqlite::Error) -> EngineError {
    EngineError::InternalCacheError(format!("Embedding cache query failed: {}", e))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
