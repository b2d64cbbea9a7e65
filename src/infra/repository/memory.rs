//! In-memory job repository.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::repository::JobRepository;
use crate::core::{Job, JobStatus, SchedulerError};
use crate::util::serde::JobId;

/// Job store backed by a map, for development, tests, and embedding.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get(&self, id: JobId) -> Result<Option<Job>, SchedulerError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn put(&self, job: &Job) -> Result<(), SchedulerError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<Option<Job>, SchedulerError> {
        Ok(self.jobs.write().remove(&id))
    }

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>, SchedulerError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at_ms);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_query() {
        let repo = InMemoryJobRepository::new();
        let a = Job::new("a", 1);
        let mut b = Job::new("b", 2);
        b.transition(JobStatus::Cancelled, 3).unwrap();
        repo.put(&a).await.unwrap();
        repo.put(&b).await.unwrap();

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get(a.id).await.unwrap().unwrap().work_item_id, "a");
        let pending = repo.query_by_status(JobStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert!(repo.get(uuid::Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(repo.delete(a.id).await.unwrap().unwrap().id, a.id);
        assert!(repo.delete(a.id).await.unwrap().is_none());
        assert_eq!(repo.len(), 1);
    }
}
