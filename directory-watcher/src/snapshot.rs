//! Point-in-time listings of a directory's immediate children.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;
use crate::event::{EntryKind, WatchEvent};

/// What a snapshot remembers about one child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    /// File or directory.
    pub kind: EntryKind,

    /// Last-modified time, if the platform reports one.
    pub modified: Option<DateTime<Utc>>,

    /// Size in bytes. Always zero for directories.
    pub size: u64,

    /// Number of immediate children. Always zero for files.
    pub child_count: usize,
}

impl EntrySnapshot {
    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        if metadata.is_dir() {
            // An unreadable child directory still gets an entry; its count is
            // simply unknown.
            let child_count = std::fs::read_dir(path)
                .map(Iterator::count)
                .unwrap_or_default();
            Self {
                kind: EntryKind::Directory,
                modified,
                size: 0,
                child_count,
            }
        } else {
            Self {
                kind: EntryKind::File,
                modified,
                size: metadata.len(),
                child_count: 0,
            }
        }
    }

    /// Whether `other` describes the same entry in a different state.
    fn changed_from(&self, other: &EntrySnapshot) -> bool {
        self.modified != other.modified
            || self.size != other.size
            || self.child_count != other.child_count
    }
}

/// The immediate children of a directory at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    entries: BTreeMap<PathBuf, EntrySnapshot>,
    captured_at: DateTime<Utc>,
}

impl DirectorySnapshot {
    /// A snapshot with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            captured_at: Utc::now(),
        }
    }

    /// List the immediate children of `directory`.
    ///
    /// Children are keyed by `directory.join(name)`, so relative watch
    /// directories produce relative paths.
    pub fn capture(directory: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(directory)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", directory.display()),
            )
            .into());
        }

        let mut entries = BTreeMap::new();
        let walker = WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);

        for entry in walker {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Removed between the listing and the stat.
                Err(err) if is_not_found(&err) => continue,
                Err(err) => return Err(err.into()),
            };

            let path = entry.into_path();
            let snapshot = EntrySnapshot::from_metadata(&path, &metadata);
            entries.insert(path, snapshot);
        }

        Ok(Self {
            entries,
            captured_at: Utc::now(),
        })
    }

    /// When the listing was taken.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory had no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up one child.
    pub fn get(&self, path: &Path) -> Option<&EntrySnapshot> {
        self.entries.get(path)
    }

    /// Children in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &EntrySnapshot)> {
        self.entries.iter().map(|(path, entry)| (path.as_path(), entry))
    }

    /// Changes that turn `self` into `current`, ordered by path.
    ///
    /// A path whose kind flipped (a file replaced by a directory of the same
    /// name) yields a deletion of the old kind followed by an addition of the
    /// new one.
    pub fn diff(&self, current: &DirectorySnapshot) -> Vec<SnapshotChange> {
        let mut changes = Vec::new();

        let mut previous = self.entries.iter().peekable();
        let mut next = current.entries.iter().peekable();

        loop {
            match (previous.peek(), next.peek()) {
                (Some((old_path, old)), Some((new_path, new))) => {
                    if old_path < new_path {
                        changes.push(SnapshotChange::deleted(old_path, old.kind));
                        previous.next();
                    } else if new_path < old_path {
                        changes.push(SnapshotChange::added(new_path, new.kind));
                        next.next();
                    } else {
                        if old.kind != new.kind {
                            changes.push(SnapshotChange::deleted(old_path, old.kind));
                            changes.push(SnapshotChange::added(new_path, new.kind));
                        } else if new.changed_from(old) {
                            changes.push(SnapshotChange::modified(new_path, new.kind));
                        }
                        previous.next();
                        next.next();
                    }
                }
                (Some((old_path, old)), None) => {
                    changes.push(SnapshotChange::deleted(old_path, old.kind));
                    previous.next();
                }
                (None, Some((new_path, new))) => {
                    changes.push(SnapshotChange::added(new_path, new.kind));
                    next.next();
                }
                (None, None) => break,
            }
        }

        changes
    }
}

impl Default for DirectorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// One difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChange {
    /// The event to publish.
    pub event: WatchEvent,

    /// The affected child.
    pub path: PathBuf,
}

impl SnapshotChange {
    fn added(path: &Path, kind: EntryKind) -> Self {
        Self {
            event: WatchEvent::added(kind),
            path: path.to_path_buf(),
        }
    }

    fn deleted(path: &Path, kind: EntryKind) -> Self {
        Self {
            event: WatchEvent::deleted(kind),
            path: path.to_path_buf(),
        }
    }

    fn modified(path: &Path, kind: EntryKind) -> Self {
        Self {
            event: WatchEvent::modified(kind),
            path: path.to_path_buf(),
        }
    }
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
}
