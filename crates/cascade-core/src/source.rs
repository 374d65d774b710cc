//! Candidate retrieval seam
//!
//! A [`CandidateSource`] yields a complete candidate set for one stage of a
//! cascade; whether it is local, networked, or synthetic is invisible to the
//! core. [`StaticSource`] is the in-memory implementation used by the demo
//! binary and the test suites.

use crate::error::SourceError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

/// Asynchronous provider of a complete candidate set.
///
/// `key` is the ordered prefix of committed upstream selections; stage 0
/// receives an empty key. Implementations should observe `cancel` at their
/// own suspension points and return promptly once it fires; the retry
/// executor races every attempt against the same token regardless.
#[async_trait::async_trait]
pub trait CandidateSource<T>: Send + Sync {
    async fn fetch(&self, key: &[T], cancel: &CancellationToken) -> Result<Vec<T>, SourceError>;
}

/// In-memory source keyed by the upstream-selection prefix.
///
/// Failures can be scripted per key: the next `n` fetches for that key
/// report [`SourceError::Unavailable`] before entries are served again.
/// Every fetch is recorded in a log that tests can inspect.
pub struct StaticSource<T> {
    entries: HashMap<Vec<T>, Vec<T>>,
    failures: Mutex<HashMap<Vec<T>, u32>>,
    log: Mutex<Vec<Vec<T>>>,
}

impl<T> StaticSource<T>
where
    T: Clone + Eq + Hash + Send + Sync,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Registers the candidate set served for `key`.
    #[must_use]
    pub fn with_entry(mut self, key: Vec<T>, candidates: Vec<T>) -> Self {
        self.entries.insert(key, candidates);
        self
    }

    /// Scripts `count` consecutive failures for `key` before entries are
    /// served again.
    pub fn script_failures(&self, key: Vec<T>, count: u32) {
        self.failures.lock().insert(key, count);
    }

    /// Every key fetched so far, in call order.
    #[must_use]
    pub fn fetch_log(&self) -> Vec<Vec<T>> {
        self.log.lock().clone()
    }

    /// Number of fetches observed so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.log.lock().len()
    }
}

impl<T> Default for StaticSource<T>
where
    T: Clone + Eq + Hash + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<T> CandidateSource<T> for StaticSource<T>
where
    T: Clone + Eq + Hash + Send + Sync,
{
    async fn fetch(&self, key: &[T], _cancel: &CancellationToken) -> Result<Vec<T>, SourceError> {
        self.log.lock().push(key.to_vec());
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::Unavailable("scripted failure".into()));
                }
            }
        }
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::Fetch(format!("no entry for key of length {}", key.len())))
    }
}
