use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{info, warn};
use serde_json::Value;

use crate::bundle::job::Job;
use crate::bundle::ordered::OrderedMap;
use crate::bundle::Bundle;
use crate::error::{MilexError, Result};
use crate::store::schema::BundleSchema;
use crate::store::versioned::{now, VersionedStore};

/// Saves and loads versioned bundle documents (`{bundle_name}_{timestamp}.json`)
#[derive(Debug)]
pub struct BundleStore {
    versions: VersionedStore,
    schema: BundleSchema,
}

impl BundleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(BundleStore { versions: VersionedStore::new(dir, "json"), schema: BundleSchema::load()? })
    }

    pub fn dir(&self) -> &Path {
        self.versions.dir()
    }

    /// All saved versions of a bundle, oldest first
    pub fn versions(&self, name: &str) -> Result<Vec<NaiveDateTime>> {
        self.versions.versions(name)
    }

    /// Save jobs as a new version of `name`, stamped with the current time
    pub fn save(&self, name: &str, jobs: Vec<Job>) -> Result<Bundle> {
        self.save_at(name, jobs, now())
    }

    /// Save jobs as a new version of `name` at `timestamp`
    ///
    /// An existing version for the same second is never overwritten; the timestamp is bumped
    /// forward instead.
    pub fn save_at(&self, name: &str, jobs: Vec<Job>, timestamp: NaiveDateTime) -> Result<Bundle> {
        let timestamp = self.versions.vacant(name, timestamp);
        let bundle = Bundle::new(name, timestamp, jobs);
        self.write(&bundle)?;
        Ok(bundle)
    }

    /// Merge jobs into the latest version of `name`, or save a new version if there is none
    ///
    /// Jobs whose names are already taken are renamed `{name}_001`, `{name}_002`, ... The
    /// existing entries are never replaced.
    pub fn append(&self, name: &str, jobs: Vec<Job>) -> Result<Bundle> {
        let mut bundle = match self.versions.nearest(name, None)? {
            Some(timestamp) => self.read(name, timestamp)?,
            None => {
                info!("No existing bundle named {name}, creating a new one");
                return self.save(name, jobs);
            }
        };

        for mut job in jobs {
            let unique = unique_name(&bundle.jobs, &job.name);
            if unique != job.name {
                warn!("Job {} already exists in bundle {name}, renaming to {unique}", job.name);
            }
            job.name = unique.clone();
            bundle.jobs.push(unique, job);
        }

        self.write(&bundle)?;
        Ok(bundle)
    }

    /// Load the version of `name` nearest to `date` (latest if `date` is None)
    pub fn load(&self, name: &str, date: Option<NaiveDateTime>) -> Result<Bundle> {
        match self.versions.nearest(name, date)? {
            Some(timestamp) => self.read(name, timestamp),
            None => Err(MilexError::BundleNotFound { name: name.to_string(), dir: self.dir().to_path_buf() }),
        }
    }

    fn read(&self, name: &str, timestamp: NaiveDateTime) -> Result<Bundle> {
        let path = self.versions.path_for(name, timestamp);
        info!("Reading bundle {}", path.display());
        let text = fs::read_to_string(&path).map_err(MilexError::io(&path))?;

        let malformed = |reason: String| MilexError::MalformedBundle { path: path.clone(), reason };

        // untyped first, so schema violations are reported before type errors
        let untyped: Value = serde_json::from_str(&text).map_err(|err| malformed(err.to_string()))?;
        self.schema.validate(&untyped).map_err(malformed)?;

        // typed from the raw text: going through Value would drop duplicate job names
        let jobs: OrderedMap<Job> = serde_json::from_str(&text).map_err(|err| malformed(err.to_string()))?;
        let jobs = jobs
            .into_iter()
            .map(|(key, mut job)| {
                job.name = key.clone();
                (key, job)
            })
            .collect();

        Ok(Bundle { name: name.to_string(), timestamp, jobs })
    }

    fn write(&self, bundle: &Bundle) -> Result<()> {
        fs::create_dir_all(self.dir()).map_err(MilexError::io(self.dir()))?;
        let path = self.versions.path_for(&bundle.name, bundle.timestamp);
        let json = serde_json::to_string_pretty(&bundle.jobs)?;
        fs::write(&path, json).map_err(MilexError::io(&path))?;
        info!("Saved bundle {} to {}", bundle.name, path.display());
        Ok(())
    }
}

/// `name` if free, otherwise the first free `{name}_NNN`
fn unique_name(jobs: &OrderedMap<Job>, name: &str) -> String {
    if !jobs.contains_key(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{name}_{n:03}"))
        .find(|candidate| !jobs.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}
