//! Custom-resource events driving reconciliation

use kube::ResourceExt;
use traincrd_core::{JobKey, TrainJob};

/// A change to one `TrainJob`, as delivered by the watch
#[derive(Debug, Clone)]
pub enum JobEvent {
    Added(TrainJob),
    Updated { old: TrainJob, new: TrainJob },
    Deleted(TrainJob),
}

impl JobEvent {
    /// Key of the job the event is about
    pub fn key(&self) -> Option<JobKey> {
        JobKey::of(self.current())
    }

    /// The most recent snapshot carried by the event
    pub fn current(&self) -> &TrainJob {
        match self {
            JobEvent::Added(job) | JobEvent::Deleted(job) => job,
            JobEvent::Updated { new, .. } => new,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            JobEvent::Added(_) => "add",
            JobEvent::Updated { .. } => "update",
            JobEvent::Deleted(_) => "delete",
        }
    }

    /// `namespace/name` for logging, tolerating incomplete metadata
    pub fn describe(&self) -> String {
        let job = self.current();
        format!(
            "{}/{}",
            job.namespace().unwrap_or_default(),
            job.name_any()
        )
    }
}
