//! Pack catalog backed by a directory of JSON files.
//!
//! Each `*.json` file in the catalog directory holds either a single pack
//! object or an array of packs. Files are read in name order; when two files
//! declare the same pack id the first one wins.
//!
//! The catalog is an explicit component with its own lifecycle. Nothing is
//! read until [`PackCatalog::load`] (or [`PackCatalog::refresh_if_stale`]) is
//! called, and [`PackCatalog::clear`] drops the cached entries.
//!
//! # Example
//!
//! ```ignore
//! let catalog = PackCatalog::new("/etc/respack/packs")
//!     .with_refresh_interval(Duration::from_secs(300));
//!
//! let report = catalog.load()?;
//! for rejected in &report.rejected {
//!     eprintln!("{}: {}", rejected.source.display(), rejected.reason);
//! }
//! let pack = catalog.get("sdxl-starter");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::ResourcePack;
use super::validation::validate_pack;
use crate::manager::{ManagerError, ManagerResult};

/// Default interval after which [`PackCatalog::refresh_if_stale`] reloads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// One catalog file: a single pack or a list of packs.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Many(Vec<ResourcePack>),
    One(Box<ResourcePack>),
}

/// A pack definition that was not accepted.
#[derive(Debug, Clone)]
pub struct RejectedPack {
    /// File the definition came from.
    pub source: PathBuf,
    /// Pack id, if it could be read.
    pub pack_id: Option<String>,
    /// Why the definition was rejected.
    pub reason: String,
}

/// Outcome of a catalog load.
#[derive(Debug, Clone, Default)]
pub struct CatalogReport {
    /// Number of packs accepted.
    pub loaded: usize,
    /// Files that were read.
    pub files: usize,
    /// Definitions that were skipped.
    pub rejected: Vec<RejectedPack>,
}

impl CatalogReport {
    /// Whether every definition was accepted.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Default)]
struct CatalogState {
    packs: IndexMap<String, ResourcePack>,
    loaded_at: Option<Instant>,
}

/// In-memory pack catalog.
pub struct PackCatalog {
    dir: Option<PathBuf>,
    refresh_interval: Duration,
    state: RwLock<CatalogState>,
}

impl PackCatalog {
    /// Create a catalog that reads packs from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Create a catalog from in-memory packs.
    ///
    /// The packs are validated the same way file entries are. Such a catalog
    /// has no directory; `load` and `refresh` keep the current entries.
    pub fn from_packs(packs: Vec<ResourcePack>) -> ManagerResult<Self> {
        let mut map = IndexMap::new();
        for pack in packs {
            validate_pack(&pack)?;
            map.entry(pack.id.clone()).or_insert(pack);
        }

        Ok(Self {
            dir: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            state: RwLock::new(CatalogState {
                packs: map,
                loaded_at: Some(Instant::now()),
            }),
        })
    }

    /// Set the staleness interval used by `refresh_if_stale`.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Staleness interval used by `refresh_if_stale`.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Catalog directory, if this catalog is file backed.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Read every pack file and replace the cached entries.
    pub fn load(&self) -> ManagerResult<CatalogReport> {
        let Some(dir) = &self.dir else {
            let mut state = self.state.write();
            state.loaded_at = Some(Instant::now());
            return Ok(CatalogReport {
                loaded: state.packs.len(),
                ..Default::default()
            });
        };

        let (packs, report) = read_catalog_dir(dir)?;

        let mut state = self.state.write();
        state.packs = packs;
        state.loaded_at = Some(Instant::now());

        info!(
            dir = %dir.display(),
            packs = report.loaded,
            rejected = report.rejected.len(),
            "Pack catalog loaded"
        );
        Ok(report)
    }

    /// Reload the catalog unconditionally.
    pub fn refresh(&self) -> ManagerResult<CatalogReport> {
        self.load()
    }

    /// Reload when the catalog was never loaded or the interval has passed.
    ///
    /// Returns `None` when the cached entries are still fresh.
    pub fn refresh_if_stale(&self) -> ManagerResult<Option<CatalogReport>> {
        let stale = match self.state.read().loaded_at {
            Some(at) => at.elapsed() >= self.refresh_interval,
            None => true,
        };
        if stale {
            self.load().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.packs.clear();
        state.loaded_at = None;
        debug!("Pack catalog cleared");
    }

    /// Whether the catalog holds loaded entries.
    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded_at.is_some()
    }

    /// All packs in catalog order.
    pub fn list(&self) -> Vec<ResourcePack> {
        self.state.read().packs.values().cloned().collect()
    }

    /// Look up a pack by id.
    pub fn get(&self, id: &str) -> Option<ResourcePack> {
        self.state.read().packs.get(id).cloned()
    }

    /// Number of cached packs.
    pub fn len(&self) -> usize {
        self.state.read().packs.len()
    }

    /// Whether the catalog holds no packs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_catalog_dir(dir: &Path) -> ManagerResult<(IndexMap<String, ResourcePack>, CatalogReport)> {
    let entries = fs::read_dir(dir).map_err(|source| ManagerError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut packs = IndexMap::new();
    let mut report = CatalogReport {
        files: files.len(),
        ..Default::default()
    };

    for file in files {
        let contents = fs::read_to_string(&file).map_err(|source| ManagerError::ReadFailed {
            path: file.clone(),
            source,
        })?;

        let parsed = match serde_json::from_str::<CatalogFile>(&contents) {
            Ok(CatalogFile::Many(list)) => list,
            Ok(CatalogFile::One(pack)) => vec![*pack],
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Skipping unreadable pack file");
                report.rejected.push(RejectedPack {
                    source: file.clone(),
                    pack_id: None,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for pack in parsed {
            if let Err(e) = validate_pack(&pack) {
                warn!(file = %file.display(), pack = %pack.id, error = %e, "Skipping invalid pack");
                report.rejected.push(RejectedPack {
                    source: file.clone(),
                    pack_id: Some(pack.id.clone()),
                    reason: e.to_string(),
                });
                continue;
            }
            if packs.contains_key(&pack.id) {
                warn!(file = %file.display(), pack = %pack.id, "Ignoring duplicate pack id");
                report.rejected.push(RejectedPack {
                    source: file.clone(),
                    pack_id: Some(pack.id.clone()),
                    reason: format!("duplicate pack id {}", pack.id),
                });
                continue;
            }
            packs.insert(pack.id.clone(), pack);
        }
    }

    report.loaded = packs.len();
    Ok((packs, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::types::{ModelSpec, Resource, ResourceKind};
    use tempfile::TempDir;

    fn pack_json(id: &str) -> String {
        format!(
            r#"{{
                "id": "{id}",
                "name": "Pack {id}",
                "resources": [{{
                    "id": "m", "name": "Model", "type": "model",
                    "urls": {{ "default": "https://example.com/m.bin" }},
                    "dir": "checkpoints", "filename": "m.bin"
                }}]
            }}"#
        )
    }

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_lazy_until_loaded() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.json", &pack_json("alpha"));

        let catalog = PackCatalog::new(temp.path());
        assert!(!catalog.is_loaded());
        assert!(catalog.get("alpha").is_none());

        let report = catalog.load().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.loaded, 1);
        assert!(catalog.is_loaded());
        assert_eq!(catalog.get("alpha").unwrap().name, "Pack alpha");
    }

    #[test]
    fn test_array_file_and_ordering() {
        let temp = TempDir::new().unwrap();
        write(
            &temp,
            "b.json",
            &format!("[{}, {}]", pack_json("beta"), pack_json("gamma")),
        );
        write(&temp, "a.json", &pack_json("alpha"));
        write(&temp, "notes.txt", "ignored");

        let catalog = PackCatalog::new(temp.path());
        let report = catalog.load().unwrap();

        assert_eq!(report.files, 2);
        let ids: Vec<String> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_invalid_and_duplicate_reported() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.json", &pack_json("alpha"));
        write(&temp, "b.json", &pack_json("alpha"));
        write(&temp, "c.json", r#"{"id": "empty", "name": "Empty", "resources": []}"#);
        write(&temp, "d.json", "{ not json");

        let catalog = PackCatalog::new(temp.path());
        let report = catalog.load().unwrap();

        assert_eq!(report.loaded, 1);
        assert_eq!(report.rejected.len(), 3);
        assert!(report.rejected[0].reason.contains("duplicate"));
        assert_eq!(report.rejected[1].pack_id.as_deref(), Some("empty"));
        assert!(report.rejected[2].pack_id.is_none());
    }

    #[test]
    fn test_refresh_picks_up_new_files() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.json", &pack_json("alpha"));

        let catalog = PackCatalog::new(temp.path()).with_refresh_interval(Duration::ZERO);
        catalog.load().unwrap();
        write(&temp, "b.json", &pack_json("beta"));

        assert!(catalog.refresh_if_stale().unwrap().is_some());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_refresh_if_stale_skips_fresh_catalog() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.json", &pack_json("alpha"));

        let catalog =
            PackCatalog::new(temp.path()).with_refresh_interval(Duration::from_secs(3600));
        assert!(catalog.refresh_if_stale().unwrap().is_some());
        assert!(catalog.refresh_if_stale().unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        write(&temp, "a.json", &pack_json("alpha"));

        let catalog = PackCatalog::new(temp.path());
        catalog.load().unwrap();
        catalog.clear();

        assert!(!catalog.is_loaded());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_missing_dir_is_error() {
        let catalog = PackCatalog::new("/nonexistent/respack/catalog");
        assert!(matches!(
            catalog.load(),
            Err(ManagerError::ReadFailed { .. })
        ));
    }

    #[test]
    fn test_from_packs_validates() {
        let good = ResourcePack::new(
            "good",
            "Good",
            vec![Resource::new(
                "m",
                "Model",
                ResourceKind::Model(ModelSpec::new(
                    "default",
                    "https://example.com/m.bin",
                    "vae",
                    "m.bin",
                )),
            )],
        );
        let catalog = PackCatalog::from_packs(vec![good.clone()]).unwrap();
        assert!(catalog.is_loaded());
        assert_eq!(catalog.get("good"), Some(good));
        assert_eq!(catalog.load().unwrap().loaded, 1);

        let empty = ResourcePack::new("empty", "Empty", vec![]);
        assert!(matches!(
            PackCatalog::from_packs(vec![empty]),
            Err(ManagerError::Validation(_))
        ));
    }
}
