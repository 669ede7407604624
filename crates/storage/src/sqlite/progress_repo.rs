use std::collections::BTreeMap;

use async_trait::async_trait;
use quiz_core::model::{AssignmentId, AssignmentProgress, QuizProgress, UserId};
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{
    conn, decode_document, decode_legacy, encode_document, encode_legacy, map_document_row, ser,
};
use crate::repository::{LegacyRoot, RemoteProgressStore, StorageError};

/// Upsert a root record, never lowering its `last_updated`.
const RAISE_ROOT: &str = r"
    INSERT INTO user_roots (uid, last_updated)
    VALUES (?1, ?2)
    ON CONFLICT(uid) DO UPDATE SET
        last_updated = MAX(COALESCE(user_roots.last_updated, 0), excluded.last_updated)
";

impl SqliteRepository {
    /// Write legacy progress fields onto a user root record.
    ///
    /// Only older clients produced these; this exists to stage migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn set_legacy_root(
        &self,
        user: &UserId,
        legacy: &LegacyRoot,
        last_updated: Option<i64>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_roots (uid, last_updated, legacy)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(uid) DO UPDATE SET
                last_updated = excluded.last_updated,
                legacy = excluded.legacy
            ",
        )
        .bind(user.as_str())
        .bind(last_updated)
        .bind(encode_legacy(legacy)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn root_row(
        &self,
        user: &UserId,
    ) -> Result<Option<(Option<i64>, Option<String>)>, StorageError> {
        let row = sqlx::query("SELECT last_updated, legacy FROM user_roots WHERE uid = ?1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.map(|row| {
            Ok((
                row.try_get::<Option<i64>, _>("last_updated").map_err(ser)?,
                row.try_get::<Option<String>, _>("legacy").map_err(ser)?,
            ))
        })
        .transpose()
    }
}

#[async_trait]
impl RemoteProgressStore for SqliteRepository {
    async fn get(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
    ) -> Result<Option<AssignmentProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT document FROM assignment_progress
            WHERE uid = ?1 AND assignment_id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(assignment.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("document").map_err(ser)?;
                decode_document(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn get_all(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT assignment_id, document FROM assignment_progress
            WHERE uid = ?1
            ORDER BY assignment_id ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let root = self.root_row(user).await?;
        if rows.is_empty() && root.is_none() {
            return Ok(None);
        }

        let mut documents = BTreeMap::new();
        for row in &rows {
            let (id, progress) = map_document_row(row)?;
            documents.insert(id, progress);
        }
        let root_stamp = root.and_then(|(stamp, _)| stamp).unwrap_or(0);
        debug!(user = %user, documents = documents.len(), "remote progress read");
        Ok(Some(QuizProgress::from_parts(documents, root_stamp)))
    }

    async fn put(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
        progress: &AssignmentProgress,
    ) -> Result<(), StorageError> {
        let document = encode_document(progress)?;
        let stamp = progress.last_updated();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO assignment_progress (uid, assignment_id, document, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(uid, assignment_id) DO UPDATE SET
                document = excluded.document,
                last_updated = excluded.last_updated
            ",
        )
        .bind(user.as_str())
        .bind(assignment.as_str())
        .bind(document)
        .bind(stamp)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query(RAISE_ROOT)
            .bind(user.as_str())
            .bind(stamp)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn touch_root(&self, user: &UserId, last_updated: i64) -> Result<(), StorageError> {
        sqlx::query(RAISE_ROOT)
            .bind(user.as_str())
            .bind(last_updated)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn legacy_root(&self, user: &UserId) -> Result<Option<LegacyRoot>, StorageError> {
        let Some((_, legacy)) = self.root_row(user).await? else {
            return Ok(None);
        };
        legacy
            .as_deref()
            .map(decode_legacy)
            .transpose()
            .map(|legacy| legacy.filter(|l| !l.is_empty()))
    }
}
