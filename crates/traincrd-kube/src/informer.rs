//! Turning the raw `TrainJob` watch into add/update/delete events
//!
//! The watcher only reports "this object now looks like X" and "this object
//! is gone". `InformerCache` remembers the last snapshot of every job so it
//! can tell an add from an update, hand both snapshots to the update path, and
//! notice jobs that vanished while the watch was being re-listed.

use std::collections::{HashMap, HashSet};

use futures::{Stream, StreamExt};
use kube::ResourceExt;
use kube::api::Api;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use tracing::{debug, warn};
use traincrd_core::{JobKey, TrainJob};

use crate::event::JobEvent;

/// Last known snapshot of every watched job
#[derive(Debug, Default)]
pub struct InformerCache {
    known: HashMap<JobKey, TrainJob>,
    /// Keys seen since the current re-list started
    relist: Option<HashSet<JobKey>>,
}

impl InformerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn get(&self, key: &JobKey) -> Option<&TrainJob> {
        self.known.get(key)
    }

    /// Fold one watcher event into the cache, returning the job events it implies
    pub fn observe(&mut self, event: Event<TrainJob>) -> Vec<JobEvent> {
        match event {
            Event::Init => {
                debug!("re-list started");
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(job) => {
                if let (Some(seen), Some(key)) = (self.relist.as_mut(), JobKey::of(&job)) {
                    seen.insert(key);
                }
                self.apply(job).into_iter().collect()
            }
            Event::InitDone => self.finish_relist(),
            Event::Apply(job) => self.apply(job).into_iter().collect(),
            Event::Delete(job) => {
                if let Some(key) = JobKey::of(&job) {
                    self.known.remove(&key);
                }
                vec![JobEvent::Deleted(job)]
            }
        }
    }

    fn apply(&mut self, job: TrainJob) -> Option<JobEvent> {
        let Some(key) = JobKey::of(&job) else {
            return Some(JobEvent::Added(job));
        };

        match self.known.insert(key, job.clone()) {
            None => Some(JobEvent::Added(job)),
            Some(old) if is_same_revision(&old, &job) => None,
            Some(old) => Some(JobEvent::Updated { old, new: job }),
        }
    }

    /// Jobs cached before the re-list but absent from it were deleted meanwhile
    fn finish_relist(&mut self) -> Vec<JobEvent> {
        let Some(seen) = self.relist.take() else {
            return Vec::new();
        };

        let mut gone: Vec<JobKey> = self
            .known
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        gone.sort();

        debug!(listed = seen.len(), vanished = gone.len(), "re-list done");
        gone.into_iter()
            .filter_map(|key| self.known.remove(&key))
            .map(JobEvent::Deleted)
            .collect()
    }
}

fn is_same_revision(old: &TrainJob, new: &TrainJob) -> bool {
    match (old.resource_version(), new.resource_version()) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}

/// Watch `api` and yield job events, re-establishing the watch on failure
pub fn job_events(
    api: Api<TrainJob>,
    config: watcher::Config,
) -> impl Stream<Item = JobEvent> + Send {
    let mut cache = InformerCache::new();

    watcher::watcher(api, config)
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "TrainJob watch error, will retry");
                    None
                }
            }
        })
        .flat_map(move |event| futures::stream::iter(cache.observe(event)))
}
