//! Subscribers and the filters that decide which events reach them.

use std::fmt;
use std::path::Path;

use parking_lot::RwLock;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SubscriptionConfig;
use crate::error::{Result, WatcherError};
use crate::event::{EntryKind, WatchEvent, WatchNotification};
use crate::watcher::DirectoryWatcher;

/// Receives events a subscriber is eligible for.
///
/// Handlers run on the watcher's poll task. A slow handler delays the next
/// poll of that watcher.
pub trait WatchEventHandler: Send + Sync {
    /// Called once per matching event.
    fn on_event(&self, watcher: &DirectoryWatcher, event: WatchEvent, path: &Path);
}

impl<F> WatchEventHandler for F
where
    F: Fn(&DirectoryWatcher, WatchEvent, &Path) + Send + Sync,
{
    fn on_event(&self, watcher: &DirectoryWatcher, event: WatchEvent, path: &Path) {
        (self)(watcher, event, path)
    }
}

/// Forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<WatchNotification>,
}

impl ChannelHandler {
    /// Create a handler sending into `tx`.
    pub fn new(tx: mpsc::UnboundedSender<WatchNotification>) -> Self {
        Self { tx }
    }
}

impl WatchEventHandler for ChannelHandler {
    fn on_event(&self, _watcher: &DirectoryWatcher, event: WatchEvent, path: &Path) {
        if self.tx.send(WatchNotification::new(event, path)).is_err() {
            debug!("Dropping {event} for {}: receiver closed", path.display());
        }
    }
}

/// A compiled filter that must match its whole subject.
#[derive(Debug, Clone)]
pub struct FilterPattern {
    source: String,
    regex: Regex,
}

impl FilterPattern {
    /// Compile `source`, rejecting the empty string.
    pub fn new(source: &str) -> Result<Self> {
        if source.is_empty() {
            return Err(WatcherError::invalid_argument("filter regex must not be empty"));
        }

        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|err| {
            WatcherError::InvalidPattern {
                pattern: source.to_string(),
                source: err,
            }
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as it was given.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern matches all of `subject`.
    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }
}

#[derive(Debug, Default)]
struct Filters {
    file_name: Option<FilterPattern>,
    file_extension: Option<FilterPattern>,
    file: Option<FilterPattern>,
    directory: Option<FilterPattern>,
}

/// A listener registered on one or more [`DirectoryWatcher`]s.
///
/// A new subscriber is subscribed to nothing and has no filters. Subscriptions
/// and filters may be changed after registration; the watcher reads them on
/// every dispatch.
pub struct Subscriber {
    subscriptions: RwLock<Vec<WatchEvent>>,
    filters: RwLock<Filters>,
    handler: Box<dyn WatchEventHandler>,
}

impl Subscriber {
    /// Create a subscriber backed by `handler`.
    pub fn new(handler: impl WatchEventHandler + 'static) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            filters: RwLock::new(Filters::default()),
            handler: Box::new(handler),
        }
    }

    /// Create a subscriber backed by a closure.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&DirectoryWatcher, WatchEvent, &Path) + Send + Sync + 'static,
    {
        Self::new(handler)
    }

    /// Create a subscriber that forwards its events into a channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WatchNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(ChannelHandler::new(tx)), rx)
    }

    /// Subscribe to `events`, keeping the order they were first added in.
    pub fn subscribe_to(&self, events: &[WatchEvent]) -> Result<()> {
        if events.is_empty() {
            return Err(WatcherError::MissingArgument("events"));
        }

        let mut subscriptions = self.subscriptions.write();
        for event in events {
            if !subscriptions.contains(event) {
                subscriptions.push(*event);
            }
        }
        Ok(())
    }

    /// The events this subscriber receives, in subscription order.
    pub fn subscriptions(&self) -> Vec<WatchEvent> {
        self.subscriptions.read().clone()
    }

    /// Whether `event` is among the subscriptions.
    pub fn is_subscribed_to(&self, event: WatchEvent) -> bool {
        self.subscriptions.read().contains(&event)
    }

    /// Filter on the file name without its extension (`temp` for `temp.txt`).
    pub fn set_file_name_regex(&self, regex: &str) -> Result<()> {
        self.filters.write().file_name = Some(FilterPattern::new(regex)?);
        Ok(())
    }

    /// The file name filter, as given.
    pub fn file_name_regex(&self) -> Option<String> {
        pattern_source(&self.filters.read().file_name)
    }

    /// Filter on the file extension, period included (`.txt`).
    pub fn set_file_extension_regex(&self, regex: &str) -> Result<()> {
        self.filters.write().file_extension = Some(FilterPattern::new(regex)?);
        Ok(())
    }

    /// The file extension filter, as given.
    pub fn file_extension_regex(&self) -> Option<String> {
        pattern_source(&self.filters.read().file_extension)
    }

    /// Filter on the full path of the affected file.
    pub fn set_file_regex(&self, regex: &str) -> Result<()> {
        self.filters.write().file = Some(FilterPattern::new(regex)?);
        Ok(())
    }

    /// The full-path filter, as given.
    pub fn file_regex(&self) -> Option<String> {
        pattern_source(&self.filters.read().file)
    }

    /// Filter on the name of the affected directory.
    pub fn set_directory_regex(&self, regex: &str) -> Result<()> {
        self.filters.write().directory = Some(FilterPattern::new(regex)?);
        Ok(())
    }

    /// The directory name filter, as given.
    pub fn directory_regex(&self) -> Option<String> {
        pattern_source(&self.filters.read().directory)
    }

    /// Whether the filters accept an entry of `kind` at `path`.
    ///
    /// Directories are only checked against the directory filter and files
    /// only against the file filters. Unset filters accept everything.
    pub fn patterns_match(&self, path: &Path, kind: EntryKind) -> bool {
        let filters = self.filters.read();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match kind {
            EntryKind::Directory => filters
                .directory
                .as_ref()
                .is_none_or(|pattern| pattern.is_match(&name)),
            EntryKind::File => {
                let (stem, extension) = split_extension(&name);
                let full_path = path.to_string_lossy();

                filters
                    .file_name
                    .as_ref()
                    .is_none_or(|pattern| pattern.is_match(stem))
                    && filters
                        .file_extension
                        .as_ref()
                        .is_none_or(|pattern| pattern.is_match(extension))
                    && filters
                        .file
                        .as_ref()
                        .is_none_or(|pattern| pattern.is_match(&full_path))
            }
        }
    }

    /// Whether `event` at `path` should be delivered to this subscriber.
    pub fn accepts(&self, event: WatchEvent, path: &Path) -> bool {
        self.is_subscribed_to(event) && self.patterns_match(path, event.entry_kind())
    }

    /// Export the current subscriptions and filters.
    pub fn config(&self) -> SubscriptionConfig {
        let filters = self.filters.read();
        SubscriptionConfig {
            events: self.subscriptions(),
            file_name_regex: pattern_source(&filters.file_name),
            file_extension_regex: pattern_source(&filters.file_extension),
            file_regex: pattern_source(&filters.file),
            directory_regex: pattern_source(&filters.directory),
        }
    }

    pub(crate) fn notify(&self, watcher: &DirectoryWatcher, event: WatchEvent, path: &Path) {
        self.handler.on_event(watcher, event, path);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("subscriptions", &*self.subscriptions.read())
            .field("filters", &*self.filters.read())
            .finish_non_exhaustive()
    }
}

fn pattern_source(pattern: &Option<FilterPattern>) -> Option<String> {
    pattern.as_ref().map(|pattern| pattern.as_str().to_string())
}

/// Split `name` at its final period: `("temp", ".txt")`.
///
/// Names without a period, or ending in one, have no extension. A leading
/// period counts (`.gitignore` is all extension).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index + 1 < name.len() => name.split_at(index),
        _ => (name, ""),
    }
}
