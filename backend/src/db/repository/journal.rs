//! Journal repository trait: progress logs, audit trail and file storage.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{AuditEntry, FileId, ProgressEntry, StoredFile};

/// Repository trait for operational records written alongside business data.
#[async_trait]
pub trait JournalRepository: Send + Sync {
    /// Append a progress entry for `(parent_id, kind)`.
    ///
    /// # Arguments
    /// * `reset` - Discard earlier entries of the same log before appending
    async fn append_progress(
        &self,
        parent_id: i64,
        kind: &str,
        entry: &ProgressEntry,
        reset: bool,
    ) -> RepositoryResult<()>;

    /// Read a progress log in append order.
    async fn fetch_progress(&self, parent_id: i64, kind: &str)
        -> RepositoryResult<Vec<ProgressEntry>>;

    async fn record_audit(&self, entry: &AuditEntry) -> RepositoryResult<()>;

    /// Most recent audit entries first.
    async fn list_audit(&self, limit: usize) -> RepositoryResult<Vec<AuditEntry>>;

    /// Persist a generated file.
    async fn store_file(&self, file_name: &str, bytes: &[u8]) -> RepositoryResult<FileId>;

    async fn get_file(&self, id: FileId) -> RepositoryResult<StoredFile>;
}
