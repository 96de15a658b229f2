//! Reference-counted record of datasets currently being downloaded over HTTP.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::DatasetId;

/// Counts in-progress downloads per dataset.
///
/// Entries are removed when their count drops to zero, so the registry only
/// ever holds datasets with at least one active download.
#[derive(Debug, Default)]
pub struct DownloadActivityRegistry {
    counts: Mutex<HashMap<DatasetId, u32>>,
}

impl DownloadActivityRegistry {
    /// Record the start of a download; returns the new count.
    pub fn begin(&self, dataset_id: &DatasetId) -> u32 {
        let mut counts = self.lock();
        let count = counts.entry(dataset_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Record the end of a download; returns the remaining count.
    ///
    /// Finishing a dataset with no active download is a no-op.
    pub fn finish(&self, dataset_id: &DatasetId) -> u32 {
        let mut counts = self.lock();
        let Some(count) = counts.get_mut(dataset_id) else {
            return 0;
        };
        *count = count.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            counts.remove(dataset_id);
        }
        remaining
    }

    /// Whether at least one download of the dataset is in progress.
    pub fn is_downloading(&self, dataset_id: &DatasetId) -> bool {
        self.active(dataset_id) > 0
    }

    /// Number of downloads of the dataset in progress.
    pub fn active(&self, dataset_id: &DatasetId) -> u32 {
        self.lock().get(dataset_id).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DatasetId, u32>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn counts_overlapping_downloads() {
        let registry = DownloadActivityRegistry::default();
        let dataset = DatasetId::new("42");

        assert_eq!(registry.begin(&dataset), 1);
        assert_eq!(registry.begin(&dataset), 2);
        assert!(registry.is_downloading(&dataset));

        assert_eq!(registry.finish(&dataset), 1);
        assert!(registry.is_downloading(&dataset));
        assert_eq!(registry.finish(&dataset), 0);
        assert!(!registry.is_downloading(&dataset));
    }

    #[rstest]
    fn finishing_unknown_dataset_is_a_no_op() {
        let registry = DownloadActivityRegistry::default();
        let dataset = DatasetId::new("7");

        assert_eq!(registry.finish(&dataset), 0);
        assert_eq!(registry.active(&dataset), 0);
        assert_eq!(registry.begin(&dataset), 1);
    }
}
