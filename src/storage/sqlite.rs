//! SQLite-backed record store.
//!
//! Records are keyed rows, not a rewritten blob: appending an
//! enrollment batch and flipping the trained flag happen inside one
//! transaction, so concurrent enrollments for different people cannot
//! lose each other's writes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::matcher::{Embedding, KnownFace};

use super::traits::FaceStore;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS faces (
                id TEXT PRIMARY KEY,
                person_name TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_faces_person_name ON faces(person_name)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS persons (
                name TEXT PRIMARY KEY,
                trained INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("SQLite database initialized");
        Ok(())
    }
}

#[async_trait]
impl FaceStore for SqliteStorage {
    async fn load_known(&self) -> Result<Vec<KnownFace>> {
        let rows = sqlx::query("SELECT person_name, embedding FROM faces ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            records.push(KnownFace {
                name: row.get("person_name"),
                embedding: Embedding::from_le_bytes(&blob)?,
            });
        }
        Ok(records)
    }

    async fn record_enrollment(&self, person: &str, embeddings: &[Embedding]) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let mut tx = self.pool.begin().await?;

        for embedding in embeddings {
            sqlx::query(
                "INSERT INTO faces (id, person_name, embedding, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(person)
            .bind(embedding.to_le_bytes())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO persons (name, trained) VALUES (?, 1)
             ON CONFLICT(name) DO UPDATE SET trained = 1",
        )
        .bind(person)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(person, count = embeddings.len(), "enrollment batch committed");
        Ok(())
    }

    async fn training_status(&self) -> Result<HashMap<String, bool>> {
        let rows = sqlx::query("SELECT name, trained FROM persons")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("name"), row.get::<i64, _>("trained") != 0))
            .collect())
    }

    async fn remove_person(&self, person: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM faces WHERE person_name = ?")
            .bind(person)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM persons WHERE name = ?")
            .bind(person)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn count_records(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM faces")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}
