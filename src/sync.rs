//! Sync engine
//!
//! Mirrors one relative subtree at a time from the local source root to the
//! remote destination root, either verbatim or with a one-time database
//! conversion per file stem. Transfers are full idempotent overwrites: no
//! content comparison, every file is sent on every run, and re-running
//! against an unchanged tree is always safe.
//!
//! Per-item failures (missing local file, remote mkdir/put failure, failed
//! conversion) are logged, counted and skipped; a single bad file must
//! never abort delivery of the rest of a subtree.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::trim_path;
use crate::connector::{ConnectorError, RemoteConnector};
use crate::convert::Converter;

/// Extensions of the paired database files handled by the conversion mode
const DATABASE_EXTENSIONS: [&str; 2] = ["mst", "xrf"];

/// Outcome counters for one or more transfer operations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub files_sent: u64,
    pub dirs_created: u64,
    pub failed: u64,
    pub conversions_failed: u64,
}

impl TransferStats {
    pub fn merge(&mut self, other: &TransferStats) {
        self.files_sent += other.files_sent;
        self.dirs_created += other.dirs_created;
        self.failed += other.failed;
        self.conversions_failed += other.conversions_failed;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.conversions_failed > 0
    }
}

/// Mirrors subtrees between a local source root and a remote destination root
pub struct SyncEngine {
    connector: Box<dyn RemoteConnector>,
    converter: Box<dyn Converter>,
    source_dir: String,
    destiny_dir: String,
}

impl SyncEngine {
    pub fn new(
        connector: Box<dyn RemoteConnector>,
        converter: Box<dyn Converter>,
        source_dir: &str,
        destiny_dir: &str,
    ) -> Self {
        Self {
            connector,
            converter,
            source_dir: trim_path(source_dir),
            destiny_dir: trim_path(destiny_dir),
        }
    }

    /// Establish the session up front; delegates to the connector.
    pub fn connect(&mut self) -> Result<(), ConnectorError> {
        self.connector.connect()
    }

    /// Mirror `source_dir/base_path` to `destiny_dir/base_path`, every file
    /// and directory, unconditionally.
    pub fn transfer_tree_verbatim(&mut self, base_path: &str) -> TransferStats {
        let base_path = base_path.replace('\\', "/");
        let mut stats = TransferStats::default();

        self.make_remote_dirs(&base_path, &mut stats);

        let root = format!("{}/{}", self.source_dir, base_path);
        let prefix = format!("{}/", self.source_dir);
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    self.note_walk_error(&root, e, &mut stats);
                    continue;
                }
            };
            let local_str = entry.path().to_string_lossy().replace('\\', "/");
            let Some(rel) = local_str.strip_prefix(&prefix).map(str::to_string) else {
                continue;
            };
            let remote = format!("{}/{}", self.destiny_dir, rel);

            if entry.file_type().is_dir() {
                // The subtree root was already created in the preamble.
                // Creating every directory seen by the walk also covers
                // empty ones, which no upload would bring into existence.
                if entry.depth() > 0 {
                    self.mkdir_logged(&remote, &mut stats);
                }
            } else if entry.file_type().is_file() {
                self.put_logged(entry.path(), &remote, &mut stats);
            }
        }

        stats
    }

    /// Mirror only the paired database files (`.mst`/`.xrf`) of
    /// `source_dir/base_path`, converting each pair at most once per call
    /// when `compatibility_mode` is set.
    pub fn transfer_tree_with_conversion(
        &mut self,
        base_path: &str,
        compatibility_mode: bool,
    ) -> TransferStats {
        let base_path = base_path.replace('\\', "/");
        let mut stats = TransferStats::default();

        self.make_remote_dirs(&base_path, &mut stats);

        let root = format!("{}/{}", self.source_dir, base_path);
        let prefix = format!("{}/", self.source_dir);
        // Stems converted during this call; both extensions of a pair are
        // seen by the walk but the pair is converted and sent only once.
        let mut converted: HashSet<String> = HashSet::new();

        // Sorting makes walkdir snapshot each directory before descending,
        // so conversion artifacts written mid-walk are never re-enumerated.
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    self.note_walk_error(&root, e, &mut stats);
                    continue;
                }
            };
            let local_str = entry.path().to_string_lossy().replace('\\', "/");
            let Some(rel) = local_str.strip_prefix(&prefix).map(str::to_string) else {
                continue;
            };
            let remote = format!("{}/{}", self.destiny_dir, rel);

            if entry.file_type().is_dir() {
                if entry.depth() > 0 {
                    self.mkdir_logged(&remote, &mut stats);
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(ext) = Path::new(&local_str)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
            else {
                continue;
            };
            if !DATABASE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            if !compatibility_mode {
                self.put_logged(entry.path(), &remote, &mut stats);
                continue;
            }

            // Drop ".mst"/".xrf" to address the pair by its stem
            let stem = local_str[..local_str.len() - 4].to_string();
            if converted.contains(&stem) {
                continue;
            }
            converted.insert(stem.clone());

            let converted_stem = format!("{}_converted", stem);
            if !self.converter.convert(&stem, &converted_stem) {
                stats.conversions_failed += 1;
                continue;
            }

            let remote_stem = &remote[..remote.len() - 4];
            for extension in DATABASE_EXTENSIONS {
                let from = format!("{}.{}", converted_stem, extension);
                let to = format!("{}.{}", remote_stem, extension);
                // The converted artifact is transient; remove it only once
                // its upload is confirmed, a failed put keeps the file
                // around for a later re-run.
                if self.put_logged(Path::new(&from), &to, &mut stats) {
                    local_remove(&from);
                }
            }
        }

        stats
    }

    /// Upload a single file to `destiny_dir/remote_rel`, creating the
    /// destination directory chain first.
    pub fn send_file(&mut self, local: &Path, remote_rel: &str) -> TransferStats {
        let remote_rel = remote_rel.replace('\\', "/");
        let mut stats = TransferStats::default();
        if let Some((parent, _)) = remote_rel.rsplit_once('/') {
            self.make_remote_dirs(parent, &mut stats);
        }
        let remote = format!("{}/{}", self.destiny_dir, remote_rel);
        self.put_logged(local, &remote, &mut stats);
        stats
    }

    /// Create the destination directory chain for `base_path`, one prefix at
    /// a time so every parent exists before its children.
    fn make_remote_dirs(&mut self, base_path: &str, stats: &mut TransferStats) {
        let mut path = String::new();
        for segment in base_path.split('/') {
            if segment.is_empty() {
                continue;
            }
            path.push('/');
            path.push_str(segment);
            let remote = format!("{}{}", self.destiny_dir, path);
            self.mkdir_logged(&remote, stats);
        }
    }

    fn mkdir_logged(&mut self, remote: &str, stats: &mut TransferStats) {
        match self.connector.mkdir(remote) {
            Ok(()) => stats.dirs_created += 1,
            Err(e) => {
                error!("fail while creating directory ({}): {}", remote, e);
                stats.failed += 1;
            }
        }
    }

    fn put_logged(&mut self, local: &Path, remote: &str, stats: &mut TransferStats) -> bool {
        match self.connector.put(local, remote) {
            Ok(()) => {
                stats.files_sent += 1;
                true
            }
            Err(e) => {
                error!(
                    "fail while copying file ({}) to ({}): {}",
                    local.display(),
                    remote,
                    e
                );
                stats.failed += 1;
                false
            }
        }
    }

    fn note_walk_error(&self, root: &str, e: walkdir::Error, stats: &mut TransferStats) {
        // A missing subtree is normal (not every issue has translations);
        // only errors below the root count as failures.
        if e.depth() == 0 {
            debug!("nothing to send under ({}): {}", root, e);
        } else {
            warn!("skipping unreadable entry under ({}): {}", root, e);
            stats.failed += 1;
        }
    }
}

fn local_remove(path: &str) {
    info!("removing temporary file ({})", path);
    match std::fs::remove_file(path) {
        Ok(()) => debug!("temporary file has been removed ({})", path),
        Err(e) => error!("fail while removing temporary file ({}): {}", path, e),
    }
}
