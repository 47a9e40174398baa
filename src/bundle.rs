//! Job bundles: named, timestamped collections of jobs

/// Order-preserving JSON objects
pub mod ordered;

/// A single job and its argument values
pub mod job;

use chrono::NaiveDateTime;

use crate::bundle::job::Job;
use crate::bundle::ordered::OrderedMap;

/// Timestamp format used in bundle and script filenames
pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// A named, versioned collection of jobs
///
/// The on-disk document is an object of job name -> job. Job order is the document order and is
/// kept through every load and save.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub name: String,
    pub timestamp: NaiveDateTime,
    pub jobs: OrderedMap<Job>,
}

impl Bundle {
    /// Build a bundle from jobs, keyed by each job's name
    pub fn new(name: impl Into<String>, timestamp: NaiveDateTime, jobs: Vec<Job>) -> Self {
        let jobs = jobs.into_iter().map(|job| (job.name.clone(), job)).collect();
        Bundle { name: name.into(), timestamp, jobs }
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// Timestamp as it appears in filenames
    pub fn stamp(&self) -> String {
        self.timestamp.format(DATE_FORMAT).to_string()
    }
}
