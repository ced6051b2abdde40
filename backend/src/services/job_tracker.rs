//! In-memory tracking of import jobs started from the HTTP layer.
//!
//! A job carries timestamped log lines, a file counter and, once finished, a
//! JSON result. Jobs are not persisted; a restart forgets them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::SourceSystem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FactImport(SourceSystem),
    CoverageRebuild,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub files_total: usize,
    pub files_done: usize,
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-file import outcomes once the job has finished
    pub result: Option<serde_json::Value>,
}

#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job over `files_total` files and return its id.
    pub fn create_job(&self, kind: JobKind, files_total: usize) -> String {
        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            job_id: job_id.clone(),
            kind,
            status: JobStatus::Running,
            files_total,
            files_done: 0,
            logs: vec![],
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        };
        self.jobs.write().insert(job_id.clone(), job);
        job_id
    }

    pub fn log(&self, job_id: &str, level: LogLevel, message: impl Into<String>) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.logs.push(LogEntry {
                timestamp: Utc::now(),
                level,
                message: message.into(),
            });
        }
    }

    /// Count one more processed file.
    pub fn advance(&self, job_id: &str) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.files_done += 1;
        }
    }

    pub fn complete_job(&self, job_id: &str, result: Option<serde_json::Value>) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.result = result;
        }
    }

    /// Mark a job failed, keeping any partial result.
    pub fn fail_job(
        &self,
        job_id: &str,
        error_message: impl Into<String>,
        partial: Option<serde_json::Value>,
    ) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.result = partial;
            job.logs.push(LogEntry {
                timestamp: Utc::now(),
                level: LogLevel::Error,
                message: error_message.into(),
            });
        }
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Log lines starting at `offset`, for incremental streaming.
    pub fn logs_since(&self, job_id: &str, offset: usize) -> Vec<LogEntry> {
        self.jobs
            .read()
            .get(job_id)
            .map(|job| job.logs.iter().skip(offset).cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let tracker = JobTracker::new();
        let id = tracker.create_job(JobKind::FactImport(SourceSystem::Cognos), 2);
        tracker.log(&id, LogLevel::Info, "first");
        tracker.advance(&id);
        tracker.log(&id, LogLevel::Success, "second");

        let job = tracker.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.files_done, 1);
        assert_eq!(tracker.logs_since(&id, 1).len(), 1);

        tracker.fail_job(&id, "broken file", None);
        let job = tracker.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.logs.last().unwrap().level, LogLevel::Error);
        assert!(tracker.get_job("missing").is_none());
    }
}
