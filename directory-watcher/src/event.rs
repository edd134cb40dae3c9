//! Events published by a directory watcher.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change observed in the watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEvent {
    /// A file appeared.
    FileAdded,

    /// A file disappeared.
    FileDeleted,

    /// A file's fingerprint changed.
    FileModified,

    /// A directory appeared.
    DirectoryAdded,

    /// A directory disappeared.
    DirectoryDeleted,

    /// A directory's fingerprint changed.
    DirectoryModified,
}

impl WatchEvent {
    /// Every event kind in declaration order.
    pub const ALL: [WatchEvent; 6] = [
        Self::FileAdded,
        Self::FileDeleted,
        Self::FileModified,
        Self::DirectoryAdded,
        Self::DirectoryDeleted,
        Self::DirectoryModified,
    ];

    /// Every event kind in declaration order.
    pub fn values() -> &'static [WatchEvent] {
        &Self::ALL
    }

    /// The event for an entry of `kind` appearing.
    pub fn added(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::FileAdded,
            EntryKind::Directory => Self::DirectoryAdded,
        }
    }

    /// The event for an entry of `kind` disappearing.
    pub fn deleted(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::FileDeleted,
            EntryKind::Directory => Self::DirectoryDeleted,
        }
    }

    /// The event for an entry of `kind` changing in place.
    pub fn modified(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::FileModified,
            EntryKind::Directory => Self::DirectoryModified,
        }
    }

    /// The kind of entry this event is about.
    pub fn entry_kind(self) -> EntryKind {
        match self {
            Self::FileAdded | Self::FileDeleted | Self::FileModified => EntryKind::File,
            Self::DirectoryAdded | Self::DirectoryDeleted | Self::DirectoryModified => {
                EntryKind::Directory
            }
        }
    }

    /// The upper-snake name used in configs and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileAdded => "FILE_ADDED",
            Self::FileDeleted => "FILE_DELETED",
            Self::FileModified => "FILE_MODIFIED",
            Self::DirectoryAdded => "DIRECTORY_ADDED",
            Self::DirectoryDeleted => "DIRECTORY_DELETED",
            Self::DirectoryModified => "DIRECTORY_MODIFIED",
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a directory child is a file or a directory.
///
/// Anything that is not a directory (symlinks included, which are not
/// followed) counts as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One event delivered to a subscriber, owned so it can cross a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchNotification {
    /// The kind of event.
    pub event: WatchEvent,

    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// When the event was dispatched.
    pub timestamp: DateTime<Utc>,
}

impl WatchNotification {
    /// Create a notification stamped with the current time.
    pub fn new(event: WatchEvent, path: impl Into<PathBuf>) -> Self {
        Self {
            event,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_values_in_declaration_order() {
        assert_eq!(
            WatchEvent::values(),
            &[
                WatchEvent::FileAdded,
                WatchEvent::FileDeleted,
                WatchEvent::FileModified,
                WatchEvent::DirectoryAdded,
                WatchEvent::DirectoryDeleted,
                WatchEvent::DirectoryModified,
            ]
        );
    }

    #[test]
    fn test_kind_mapping_round_trips() {
        for event in WatchEvent::values() {
            let kind = event.entry_kind();
            let rebuilt = [
                WatchEvent::added(kind),
                WatchEvent::deleted(kind),
                WatchEvent::modified(kind),
            ];
            assert!(rebuilt.contains(event), "{event} not rebuilt from {kind:?}");
        }
    }

    #[test]
    fn test_serde_uses_event_names() {
        let json = serde_json::to_string(&WatchEvent::DirectoryModified).unwrap();
        assert_eq!(json, "\"DIRECTORY_MODIFIED\"");

        let parsed: WatchEvent = serde_json::from_str("\"FILE_ADDED\"").unwrap();
        assert_eq!(parsed, WatchEvent::FileAdded);
        assert_eq!(parsed.to_string(), "FILE_ADDED");
    }

    #[test]
    fn test_notification_creation() {
        let notification = WatchNotification::new(WatchEvent::FileDeleted, "/tmp/a.txt");
        assert_eq!(notification.event, WatchEvent::FileDeleted);
        assert_eq!(notification.path, Path::new("/tmp/a.txt"));
    }
}
