//! Job store held in process memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{JobRecord, JobStore, JobStoreError, LabelSelector};

/// A [`JobStore`] backed by a map. Cloning shares the map.
///
/// Records live only as long as the process. Completed ones are kept until
/// [`InMemoryJobStore::prune_completed`] drops them, so a redelivery within
/// the retention window still finds the records it created.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, JobRecord>>, JobStoreError> {
        self.jobs
            .lock()
            .map_err(|_| JobStoreError::Other("job store lock poisoned".to_string()))
    }

    /// Every stored record, in no particular order.
    pub fn all(&self) -> Vec<JobRecord> {
        self.lock()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|jobs| jobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops records that completed before `cutoff`. Returns how many went.
    pub fn prune_completed(&self, cutoff: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut jobs = self.lock()?;
        let before = jobs.len();
        jobs.retain(|_, job| {
            job.status
                .completion_time
                .is_none_or(|completed| completed >= cutoff)
        });
        Ok(before - jobs.len())
    }
}

impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &JobRecord) -> Result<JobRecord, JobStoreError> {
        let mut jobs = self.lock()?;
        if jobs.contains_key(&job.name) {
            return Err(JobStoreError::AlreadyExists(job.name.clone()));
        }
        let mut stored = job.clone();
        stored.resource_version = 1;
        jobs.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<JobRecord>, JobStoreError> {
        let jobs = self.lock()?;
        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|job| selector.matches(&job.labels))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn update(&self, job: &JobRecord) -> Result<JobRecord, JobStoreError> {
        let mut jobs = self.lock()?;
        let stored = jobs
            .get_mut(&job.name)
            .ok_or_else(|| JobStoreError::NotFound(job.name.clone()))?;
        if stored.resource_version != job.resource_version {
            return Err(JobStoreError::Conflict {
                name: job.name.clone(),
                expected: job.resource_version,
                actual: stored.resource_version,
            });
        }
        *stored = job.clone();
        stored.resource_version += 1;
        Ok(stored.clone())
    }
}
