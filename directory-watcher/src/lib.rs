//! # Directory Watcher
//!
//! This crate provides a polling directory watcher with filtered
//! publish/subscribe dispatch. A watcher re-lists one directory (its
//! immediate children only) on a fixed interval, diffs the listing against the
//! previous one and hands each change to every subscriber that asked for it.
//!
//! ## Features
//!
//! - **Typed Events**: Six event kinds for files and directories
//! - **Filtered Subscribers**: Regexes over file name, extension, full path and
//!   directory name
//! - **Live Registration**: Subscribers may come and go while polling
//! - **Failure Isolation**: Failed polls and panicking handlers are logged and
//!   the loop continues
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatcherConfig ──► DirectoryWatcher ──► WatchEvent              │
//! │                        │                    │                   │
//! │                        ▼                    ▼                   │
//! │               DirectorySnapshot ──diff──► Subscriber            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Detection is polling-based: several changes to one entry within a single
//! interval are reported as their net effect, and an entry whose timestamp,
//! size and child count all come back unchanged is not reported.

pub mod config;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod subscriber;
pub mod watcher;

pub use config::{SubscriptionConfig, WatcherConfig};
pub use error::{Result, WatcherError};
pub use event::{EntryKind, WatchEvent, WatchNotification};
pub use snapshot::{DirectorySnapshot, EntrySnapshot, SnapshotChange};
pub use subscriber::{ChannelHandler, FilterPattern, Subscriber, WatchEventHandler};
pub use watcher::DirectoryWatcher;
