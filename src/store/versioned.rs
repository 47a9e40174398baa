use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime, SubsecRound};
use log::{debug, warn};

use crate::bundle::DATE_FORMAT;
use crate::error::{MilexError, Result};

/// Current local time at second resolution, the resolution of versioned filenames
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// A directory of `{name}_{timestamp}.{extension}` files
///
/// Each file is one version of `name`. Versions are looked up by nearest timestamp, or by the
/// latest timestamp when no date is requested.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    dir: PathBuf,
    extension: &'static str,
}

impl VersionedStore {
    pub fn new(dir: impl Into<PathBuf>, extension: &'static str) -> Self {
        VersionedStore { dir: dir.into(), extension }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, name: &str, timestamp: NaiveDateTime) -> String {
        format!("{}_{}.{}", name, timestamp.format(DATE_FORMAT), self.extension)
    }

    pub fn path_for(&self, name: &str, timestamp: NaiveDateTime) -> PathBuf {
        self.dir.join(self.file_name(name, timestamp))
    }

    /// All timestamps stored for `name`, oldest first
    ///
    /// A missing directory holds no versions. Files whose timestamp suffix can't be parsed are
    /// skipped.
    pub fn versions(&self, name: &str) -> Result<Vec<NaiveDateTime>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(MilexError::io(&self.dir)(err)),
        };

        let suffix = format!(".{}", self.extension);
        let mut versions = Vec::new();
        for entry in entries {
            let file_name = entry.map_err(MilexError::io(&self.dir))?.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            let Some(stem) = file_name.strip_suffix(&suffix) else { continue };
            let Some((prefix, stamp)) = stem.rsplit_once('_') else { continue };
            if prefix != name {
                continue;
            }
            match NaiveDateTime::parse_from_str(stamp, DATE_FORMAT) {
                Ok(timestamp) => versions.push(timestamp),
                Err(_) => warn!(
                    "Can't parse date from {file_name}, expected '{name}_{DATE_FORMAT}{suffix}'. Skipping"
                ),
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Timestamp of the version closest to `desired`, or the latest one if `desired` is None
    pub fn nearest(&self, name: &str, desired: Option<NaiveDateTime>) -> Result<Option<NaiveDateTime>> {
        let versions = self.versions(name)?;
        Ok(nearest_version(&versions, desired))
    }

    /// First free timestamp at or after `timestamp`
    ///
    /// Bumps by one second while a file for that second already exists. This only separates
    /// writes made in rapid succession by one process; concurrent writers can still race.
    pub fn vacant(&self, name: &str, timestamp: NaiveDateTime) -> NaiveDateTime {
        let mut candidate = timestamp;
        while self.path_for(name, candidate).exists() {
            debug!("{} already exists, bumping timestamp", self.file_name(name, candidate));
            candidate += Duration::seconds(1);
        }
        candidate
    }
}

/// Pick the version nearest in absolute time to `desired`; ties go to the later version
pub fn nearest_version(versions: &[NaiveDateTime], desired: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match desired {
        None => versions.iter().max().copied(),
        Some(desired) => versions
            .iter()
            .copied()
            .min_by_key(|v| ((*v - desired).num_seconds().abs(), std::cmp::Reverse(*v))),
    }
}
