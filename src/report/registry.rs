use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::ReportRecord;

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<ReportRecord>>,
    order: VecDeque<String>,
}

/// Recently assembled reports, kept in memory for re-download.
/// The oldest report is evicted once `capacity` is reached.
#[derive(Clone)]
pub struct ReportRegistry {
    inner: Arc<RwLock<Entries>>,
    capacity: usize,
}

impl ReportRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Entries::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, record: ReportRecord) -> Arc<ReportRecord> {
        let record = Arc::new(record);
        let mut guard = self.inner.write().await;

        if guard.by_id.insert(record.id.clone(), record.clone()).is_none() {
            guard.order.push_back(record.id.clone());
        }
        while guard.order.len() > self.capacity {
            if let Some(oldest) = guard.order.pop_front() {
                guard.by_id.remove(&oldest);
            }
        }

        record
    }

    pub async fn get(&self, report_id: &str) -> Option<Arc<ReportRecord>> {
        let guard = self.inner.read().await;
        guard.by_id.get(report_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ReportRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}
