//! SQLite-backed embedding store.
//!
//! Vectors are stored as JSON float lists and validated on every load.
//! Identity row ids give the enrollment order.

use async_trait::async_trait;
use facematch_core::{Embedding, EmbeddingError, EmbeddingStore, LabeledIdentity, StoreError};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS identities (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        label       TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS embeddings (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_id  INTEGER NOT NULL REFERENCES identities(id),
        vector       TEXT NOT NULL,
        created_at   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS embeddings_identity ON embeddings(identity_id);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).await.map_err(unavailable)?;
        let store = Self::migrate(conn).await?;
        tracing::info!(path = %path.display(), "embedding store opened");
        Ok(store)
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(unavailable)?;
        Self::migrate(conn).await
    }

    async fn migrate(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(unavailable)?;
        Ok(Self { conn })
    }
}

fn unavailable(err: tokio_rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn encode(label: &str, embedding: &Embedding) -> Result<String, StoreError> {
    serde_json::to_string(embedding.as_slice()).map_err(|e| StoreError::Encoding {
        label: label.to_string(),
        reason: e.to_string(),
    })
}

fn decode(label: &str, vector: &str) -> Result<Embedding, StoreError> {
    let corrupt = |source| StoreError::CorruptEmbedding {
        label: label.to_string(),
        source,
    };
    let values: Vec<f32> =
        serde_json::from_str(vector).map_err(|e| corrupt(EmbeddingError::Malformed(e.to_string())))?;
    Embedding::try_from(values).map_err(corrupt)
}

/// Fold `(label, vector)` rows, ordered by identity, into identities.
fn group_rows(rows: Vec<(String, String)>) -> Result<Vec<LabeledIdentity>, StoreError> {
    let mut identities: Vec<LabeledIdentity> = Vec::new();
    for (label, vector) in rows {
        let embedding = decode(&label, &vector)?;
        match identities.last_mut() {
            Some(last) if last.label == label => last.embeddings.push(embedding),
            _ => identities.push(LabeledIdentity::new(label, vec![embedding])),
        }
    }
    Ok(identities)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn load_all(&self) -> Result<Vec<LabeledIdentity>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.label, e.vector
                     FROM identities i JOIN embeddings e ON e.identity_id = i.id
                     ORDER BY i.id, e.id",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(unavailable)?;

        group_rows(rows)
    }

    async fn append(&self, label: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let owned_label = label.to_string();
        let vector = encode(label, embedding)?;

        let appended = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let id: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM identities WHERE label = ?1",
                        params![owned_label],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(id) = id else {
                    return Ok(false);
                };
                tx.execute(
                    "INSERT INTO embeddings (identity_id, vector, created_at) VALUES (?1, ?2, ?3)",
                    params![id, vector, now()],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(unavailable)?;

        if !appended {
            return Err(StoreError::UnknownLabel(label.to_string()));
        }
        tracing::debug!(label, "embedding appended");
        Ok(())
    }

    async fn create(&self, label: &str, embeddings: &[Embedding]) -> Result<(), StoreError> {
        if embeddings.is_empty() {
            return Err(StoreError::EmptyIdentity(label.to_string()));
        }
        let owned_label = label.to_string();
        let vectors = embeddings
            .iter()
            .map(|e| encode(label, e))
            .collect::<Result<Vec<String>, _>>()?;

        let created = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM identities WHERE label = ?1",
                        params![owned_label],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if exists {
                    return Ok(false);
                }

                let created_at = now();
                tx.execute(
                    "INSERT INTO identities (label, created_at) VALUES (?1, ?2)",
                    params![owned_label, created_at],
                )?;
                let id = tx.last_insert_rowid();
                for vector in &vectors {
                    tx.execute(
                        "INSERT INTO embeddings (identity_id, vector, created_at) VALUES (?1, ?2, ?3)",
                        params![id, vector, created_at],
                    )?;
                }
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(unavailable)?;

        if !created {
            return Err(StoreError::LabelExists(label.to_string()));
        }
        tracing::debug!(label, embeddings = embeddings.len(), "identity created");
        Ok(())
    }

    async fn find(&self, label: &str) -> Result<Option<LabeledIdentity>, StoreError> {
        let owned_label = label.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.label, e.vector
                     FROM identities i JOIN embeddings e ON e.identity_id = i.id
                     WHERE i.label = ?1
                     ORDER BY e.id",
                )?;
                let rows = stmt
                    .query_map(params![owned_label], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(unavailable)?;

        Ok(group_rows(rows)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::EMBEDDING_DIM;

    fn axis(value: f32) -> Embedding {
        let mut values = [0.0f32; EMBEDDING_DIM];
        values[0] = value;
        Embedding::new(values)
    }

    #[tokio::test]
    async fn test_create_append_load_in_enrollment_order() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("zed", &[axis(1.0)]).await.unwrap();
        store.create("amy", &[axis(2.0), axis(2.5)]).await.unwrap();
        store.append("zed", &axis(1.25)).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(
            all,
            vec![
                LabeledIdentity::new("zed", vec![axis(1.0), axis(1.25)]),
                LabeledIdentity::new("amy", vec![axis(2.0), axis(2.5)]),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_label_rejected() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("bob", &[axis(1.0)]).await.unwrap();
        let err = store.create("bob", &[axis(2.0)]).await.unwrap_err();
        assert!(matches!(err, StoreError::LabelExists(l) if l == "bob"));
        assert_eq!(store.find("bob").await.unwrap().unwrap().embeddings.len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_unknown_label() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let err = store.append("ghost", &axis(0.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownLabel(_)));
    }

    #[tokio::test]
    async fn test_find_by_label() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("bob", &[axis(1.0)]).await.unwrap();
        store.create("amy", &[axis(2.0)]).await.unwrap();

        let amy = store.find("amy").await.unwrap().unwrap();
        assert_eq!(amy.embeddings, vec![axis(2.0)]);
        assert!(store.find("carl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_vector_fails_load() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("bob", &[axis(1.0)]).await.unwrap();
        store
            .conn
            .call(|conn| {
                conn.execute("UPDATE embeddings SET vector = '[0.1, 0.2]'", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let err = store.load_all().await.unwrap_err();
        match err {
            StoreError::CorruptEmbedding { label, source } => {
                assert_eq!(label, "bob");
                assert_eq!(
                    source,
                    EmbeddingError::WrongDimension {
                        expected: EMBEDDING_DIM,
                        actual: 2
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_vector_is_corrupt() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("bob", &[axis(1.0)]).await.unwrap();
        store
            .conn
            .call(|conn| {
                conn.execute("UPDATE embeddings SET vector = '{\"0\": 0.1}'", [])?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            store.find("bob").await,
            Err(StoreError::CorruptEmbedding { .. })
        ));
    }

    #[test]
    fn test_encoded_vector_decodes_to_same_embedding() {
        let mut values = [0.0f32; EMBEDDING_DIM];
        values[3] = -0.125;
        values[127] = 1e-7;
        let embedding = Embedding::new(values);

        let json = encode("bob", &embedding).unwrap();
        assert!(json.starts_with('[') && !json.is_empty());
        assert_eq!(decode("bob", &json).unwrap(), embedding);
    }

    #[tokio::test]
    async fn test_stored_vector_is_json_list() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create("bob", &[axis(1.5)]).await.unwrap();
        let stored: String = store
            .conn
            .call(|conn| Ok(conn.query_row("SELECT vector FROM embeddings", [], |row| row.get(0))?))
            .await
            .unwrap();
        let values: Vec<f32> = serde_json::from_str(&stored).unwrap();
        assert_eq!(values.len(), EMBEDDING_DIM);
        assert_eq!(values[0], 1.5);
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_data() {
        let path = std::env::temp_dir().join(format!("facematch-store-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.create("bob", &[axis(1.0)]).await.unwrap();
            store.append("bob", &axis(1.5)).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).await.unwrap();
        let all = reopened.load_all().await.unwrap();
        assert_eq!(all, vec![LabeledIdentity::new("bob", vec![axis(1.0), axis(1.5)])]);

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
