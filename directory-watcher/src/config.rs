//! Configuration types for directory watching.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::WatchEvent;
use crate::subscriber::{Subscriber, WatchEventHandler};

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;

/// Configuration for a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Path to the directory.
    pub directory: PathBuf,

    /// Milliseconds between polls.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl WatcherConfig {
    /// Create a config polling at the default interval.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(poll_timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The poll interval as a duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Parse a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

/// Declarative form of a subscriber's events and filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Events to receive, in order.
    pub events: Vec<WatchEvent>,

    /// Regex over the file name without its extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name_regex: Option<String>,

    /// Regex over the file extension, period included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_extension_regex: Option<String>,

    /// Regex over the full file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_regex: Option<String>,

    /// Regex over the directory name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_regex: Option<String>,
}

impl SubscriptionConfig {
    /// Create an empty config: no events, no filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event.
    pub fn event(mut self, event: WatchEvent) -> Self {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    /// Set the file name regex.
    pub fn file_name(mut self, regex: impl Into<String>) -> Self {
        self.file_name_regex = Some(regex.into());
        self
    }

    /// Set the file extension regex.
    pub fn file_extension(mut self, regex: impl Into<String>) -> Self {
        self.file_extension_regex = Some(regex.into());
        self
    }

    /// Set the full-path regex.
    pub fn file(mut self, regex: impl Into<String>) -> Self {
        self.file_regex = Some(regex.into());
        self
    }

    /// Set the directory name regex.
    pub fn directory(mut self, regex: impl Into<String>) -> Self {
        self.directory_regex = Some(regex.into());
        self
    }

    /// Build a subscriber, validating every filter.
    ///
    /// An empty event list is allowed and yields a subscriber that receives
    /// nothing until it subscribes.
    pub fn build(&self, handler: impl WatchEventHandler + 'static) -> Result<Subscriber> {
        let subscriber = Subscriber::new(handler);

        if !self.events.is_empty() {
            subscriber.subscribe_to(&self.events)?;
        }
        if let Some(regex) = &self.file_name_regex {
            subscriber.set_file_name_regex(regex)?;
        }
        if let Some(regex) = &self.file_extension_regex {
            subscriber.set_file_extension_regex(regex)?;
        }
        if let Some(regex) = &self.file_regex {
            subscriber.set_file_regex(regex)?;
        }
        if let Some(regex) = &self.directory_regex {
            subscriber.set_directory_regex(regex)?;
        }

        Ok(subscriber)
    }

    /// Parse a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatcherError;
    use crate::subscriber::ChannelHandler;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tokio::sync::mpsc;

    fn handler() -> ChannelHandler {
        ChannelHandler::new(mpsc::unbounded_channel().0)
    }

    #[test]
    fn test_watcher_config_defaults() {
        let config = WatcherConfig::from_json_str(r#"{ "directory": "tmp" }"#).unwrap();
        assert_eq!(config.directory, Path::new("tmp"));
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));

        let config = WatcherConfig::new("tmp").with_poll_timeout(Duration::from_millis(50));
        assert_eq!(config.poll_timeout_ms, 50);
    }

    #[test]
    fn test_subscription_config_from_json() {
        let config = SubscriptionConfig::from_json_str(
            r#"{
                "events": ["FILE_ADDED", "FILE_DELETED"],
                "file_extension_regex": "\\.txt"
            }"#,
        )
        .unwrap();

        assert_eq!(
            config,
            SubscriptionConfig::new()
                .event(WatchEvent::FileAdded)
                .event(WatchEvent::FileDeleted)
                .file_extension(r"\.txt")
        );

        let subscriber = config.build(handler()).unwrap();
        assert_eq!(
            subscriber.subscriptions(),
            vec![WatchEvent::FileAdded, WatchEvent::FileDeleted]
        );
        assert_eq!(subscriber.config(), config);
    }

    #[test]
    fn test_build_rejects_bad_filters() {
        let err = SubscriptionConfig::new()
            .directory("")
            .build(handler())
            .unwrap_err();
        assert!(matches!(err, WatcherError::InvalidArgument(_)));

        let err = SubscriptionConfig::new()
            .file("[")
            .build(handler())
            .unwrap_err();
        assert!(matches!(err, WatcherError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = SubscriptionConfig::from_json_str(r#"{ "events": ["FILE_RENAMED"] }"#);
        assert!(matches!(result, Err(WatcherError::Serialization(_))));
    }
}
