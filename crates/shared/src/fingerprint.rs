//! URL fingerprints and the seen-set that keeps ingestion at-most-once.
//!
//! The remote articles table is the source of truth; the local cache file
//! only saves work when the table is slow or unreachable. Every load reads
//! both and unions them, so losing the local file never causes a URL that
//! is already in the table to be ingested again.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::io::{load_json_list, save_json};
use crate::sheets::TabularStore;

/// Lowercase hex SHA-256 of an item URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the remote half of a load produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLoad {
    /// No remote table configured for this run.
    Disabled,
    Loaded { rows: usize },
    /// The table could not be read; the store runs on local fingerprints.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub local: usize,
    pub remote: RemoteLoad,
    pub total: usize,
}

impl LoadReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self.remote, RemoteLoad::Unavailable(_))
    }
}

#[derive(Debug)]
pub struct FingerprintStore {
    known: HashSet<Fingerprint>,
    cache_path: PathBuf,
    report: LoadReport,
}

impl FingerprintStore {
    /// Union the local cache with fingerprints re-derived from every url in
    /// the remote table. Neither half failing aborts the load.
    pub async fn load(cache_path: impl Into<PathBuf>, remote: Option<&dyn TabularStore>) -> Self {
        let cache_path = cache_path.into();

        let mut known: HashSet<Fingerprint> = match load_json_list::<Fingerprint>(&cache_path) {
            Ok(list) => list.into_iter().collect(),
            Err(e) => {
                warn!(path = %cache_path.display(), error = %e, "fingerprints: local cache unreadable, ignoring it");
                set_aside(&cache_path);
                HashSet::new()
            }
        };
        let local = known.len();

        let remote = match remote {
            None => RemoteLoad::Disabled,
            Some(table) => match table.read_records().await {
                Ok(rows) => {
                    known.extend(
                        rows.iter()
                            .filter_map(|row| row.get("url"))
                            .map(Fingerprint::of_url),
                    );
                    info!(rows = rows.len(), "fingerprints: loaded existing articles from remote table");
                    RemoteLoad::Loaded { rows: rows.len() }
                }
                Err(e) => {
                    warn!(error = %e, "fingerprints: remote table unreachable, using local cache only");
                    RemoteLoad::Unavailable(e.to_string())
                }
            },
        };

        let report = LoadReport {
            local,
            remote,
            total: known.len(),
        };

        Self {
            known,
            cache_path,
            report,
        }
    }

    /// A store that knows nothing and persists to `cache_path`.
    pub fn empty(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            known: HashSet::new(),
            cache_path: cache_path.into(),
            report: LoadReport {
                local: 0,
                remote: RemoteLoad::Disabled,
                total: 0,
            },
        }
    }

    pub fn has(&self, fingerprint: &Fingerprint) -> bool {
        self.known.contains(fingerprint)
    }

    /// Returns false when the fingerprint was already known.
    pub fn add(&mut self, fingerprint: Fingerprint) -> bool {
        self.known.insert(fingerprint)
    }

    pub fn load_all(&self) -> &HashSet<Fingerprint> {
        &self.known
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Rewrite the whole local cache. Sorted so the file is stable between runs.
    pub fn save(&self) -> Result<()> {
        let mut list: Vec<&Fingerprint> = self.known.iter().collect();
        list.sort();
        save_json(&list, &self.cache_path)
    }
}

/// Move an unreadable cache to `<name>.bak` so the end-of-run rewrite
/// does not destroy it.
fn set_aside(cache_path: &Path) {
    let mut backup = cache_path.as_os_str().to_owned();
    backup.push(".bak");
    match fs::rename(cache_path, &backup) {
        Ok(()) => warn!(backup = %Path::new(&backup).display(), "fingerprints: kept unreadable cache"),
        Err(e) => warn!(path = %cache_path.display(), error = %e, "fingerprints: could not move unreadable cache"),
    }
}
