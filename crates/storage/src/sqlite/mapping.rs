use quiz_core::model::{AssignmentId, AssignmentProgress};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{LegacyRoot, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn encode_document(progress: &AssignmentProgress) -> Result<String, StorageError> {
    serde_json::to_string(progress).map_err(ser)
}

pub(crate) fn decode_document(raw: &str) -> Result<AssignmentProgress, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn encode_legacy(legacy: &LegacyRoot) -> Result<String, StorageError> {
    serde_json::to_string(legacy).map_err(ser)
}

pub(crate) fn decode_legacy(raw: &str) -> Result<LegacyRoot, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_document_row(
    row: &SqliteRow,
) -> Result<(AssignmentId, AssignmentProgress), StorageError> {
    let id: String = row.try_get("assignment_id").map_err(ser)?;
    let id = AssignmentId::new(id).map_err(ser)?;
    let document: String = row.try_get("document").map_err(ser)?;
    Ok((id, decode_document(&document)?))
}
