//! Operator-visible progress log of a long-running calculation.
//!
//! Entries are persisted through the journal repository and mirrored to the
//! `log` facade. Persisting is best-effort: a failed write is logged and the run
//! continues.

use chrono::Utc;
use log::{error, info, warn};

use crate::api::{ProgressEntry, ProgressLevel};
use crate::db::repository::FullRepository;

pub struct ProgressLog<'a, R: FullRepository + ?Sized> {
    repo: &'a R,
    parent_id: i64,
    kind: &'static str,
    username: String,
}

impl<'a, R: FullRepository + ?Sized> ProgressLog<'a, R> {
    pub fn new(repo: &'a R, parent_id: i64, kind: &'static str, username: impl Into<String>) -> Self {
        Self {
            repo,
            parent_id,
            kind,
            username: username.into(),
        }
    }

    async fn write(&self, level: ProgressLevel, message: String, reset: bool) {
        match level {
            ProgressLevel::Error => error!("[{} {}] {}", self.kind, self.parent_id, message),
            ProgressLevel::Warning => warn!("[{} {}] {}", self.kind, self.parent_id, message),
            _ => info!("[{} {}] {}", self.kind, self.parent_id, message),
        }
        let entry = ProgressEntry {
            timestamp: Utc::now(),
            level,
            username: self.username.clone(),
            message,
        };
        if let Err(e) = self
            .repo
            .append_progress(self.parent_id, self.kind, &entry, reset)
            .await
        {
            warn!(
                "Failed to persist progress entry for {} {}: {}",
                self.kind, self.parent_id, e
            );
        }
    }

    /// First entry of a run; discards the previous run's log.
    pub async fn start(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Start, message.into(), true).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Info, message.into(), false).await;
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Debug, message.into(), false).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Warning, message.into(), false).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Error, message.into(), false).await;
    }

    pub async fn finish(&self, message: impl Into<String>) {
        self.write(ProgressLevel::Finish, message.into(), false).await;
    }
}
