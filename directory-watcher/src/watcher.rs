//! Directory watcher implementation.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_POLL_TIMEOUT_MS, WatcherConfig};
use crate::error::{Result, WatcherError};
use crate::event::WatchEvent;
use crate::snapshot::DirectorySnapshot;
use crate::subscriber::Subscriber;

/// Polls one directory and publishes changes to its subscribers.
///
/// Cloning yields another handle to the same watcher. The poll loop stops when
/// [`stop_watching`](Self::stop_watching) is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct DirectoryWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    /// The watched directory, made absolute against the working directory at
    /// construction.
    watch_directory: PathBuf,

    /// Time between polls.
    poll_timeout: Duration,

    /// Registered subscribers in registration order.
    subscribers: RwLock<Vec<Arc<Subscriber>>>,

    /// The snapshot published by the most recent poll.
    snapshot: RwLock<Arc<DirectorySnapshot>>,

    /// Cancels the running poll loop, if any.
    poll_loop: Mutex<Option<CancellationToken>>,
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        if let Some(cancel) = self.poll_loop.get_mut().take() {
            cancel.cancel();
        }
    }
}

impl DirectoryWatcher {
    /// Create a stopped watcher for `directory`.
    ///
    /// A relative `directory` is resolved against the current working
    /// directory, so reported paths and the full-path filter always see
    /// absolute paths.
    pub fn new(directory: impl AsRef<Path>, poll_timeout: Duration) -> Result<Self> {
        let directory = directory.as_ref();

        if directory.as_os_str().is_empty() {
            return Err(WatcherError::MissingArgument("directory"));
        }
        if !directory.exists() {
            return Err(WatcherError::invalid_argument(format!(
                "directory does not exist: {}",
                directory.display()
            )));
        }
        if !directory.is_dir() {
            return Err(WatcherError::invalid_argument(format!(
                "path is not a directory: {}",
                directory.display()
            )));
        }
        if poll_timeout.is_zero() {
            return Err(WatcherError::invalid_argument(
                "poll timeout must be positive",
            ));
        }

        let directory = std::path::absolute(directory)?;

        Ok(Self {
            inner: Arc::new(WatcherInner {
                watch_directory: directory,
                poll_timeout,
                subscribers: RwLock::new(Vec::new()),
                snapshot: RwLock::new(Arc::new(DirectorySnapshot::empty())),
                poll_loop: Mutex::new(None),
            }),
        })
    }

    /// Create a stopped watcher polling at the default interval.
    pub fn with_default_poll_timeout(directory: impl AsRef<Path>) -> Result<Self> {
        Self::new(directory, Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
    }

    /// Create a stopped watcher from a config.
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        Self::new(&config.directory, config.poll_timeout())
    }

    /// The watched directory.
    pub fn watch_directory(&self) -> &Path {
        &self.inner.watch_directory
    }

    /// Time between polls.
    pub fn poll_timeout(&self) -> Duration {
        self.inner.poll_timeout
    }

    /// Whether the poll loop is running.
    pub fn is_watching(&self) -> bool {
        self.inner
            .poll_loop
            .lock()
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
    }

    /// The listing taken by the most recent poll (or the start baseline).
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&*self.inner.snapshot.read())
    }

    /// Whether both handles refer to the same watcher.
    pub fn ptr_eq(&self, other: &DirectoryWatcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a subscriber.
    ///
    /// Fails with [`WatcherError::IllegalState`] if this exact subscriber is
    /// already registered here.
    pub fn add_subscriber(&self, subscriber: Arc<Subscriber>) -> Result<()> {
        let mut subscribers = self.inner.subscribers.write();
        if subscribers.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            return Err(WatcherError::illegal_state(
                "subscriber is already registered",
            ));
        }

        subscribers.push(subscriber);
        debug!(
            "Added subscriber to {} ({} total)",
            self.inner.watch_directory.display(),
            subscribers.len()
        );
        Ok(())
    }

    /// Unregister a subscriber.
    ///
    /// Fails with [`WatcherError::IllegalState`] if it is not registered here.
    pub fn remove_subscriber(&self, subscriber: &Arc<Subscriber>) -> Result<()> {
        let mut subscribers = self.inner.subscribers.write();
        let Some(index) = subscribers.iter().position(|s| Arc::ptr_eq(s, subscriber)) else {
            return Err(WatcherError::illegal_state("subscriber is not registered"));
        };

        subscribers.remove(index);
        debug!(
            "Removed subscriber from {} ({} left)",
            self.inner.watch_directory.display(),
            subscribers.len()
        );
        Ok(())
    }

    /// Registered subscribers in registration order.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.inner.subscribers.read().clone()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Capture a baseline and start polling on the current tokio runtime.
    ///
    /// The baseline is listed synchronously on the calling thread, so this
    /// blocks for one directory listing. Entries present at this point are
    /// never reported as added. Calling this while already watching does
    /// nothing.
    pub fn start_watching(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;

        if self.is_watching() {
            return Ok(()); // Already running
        }

        let directory = &self.inner.watch_directory;
        if !directory.is_dir() {
            return Err(WatcherError::illegal_state(format!(
                "watch directory no longer exists: {}",
                directory.display()
            )));
        }

        // Listed without holding `poll_loop` so other handles are not blocked.
        let baseline = Arc::new(DirectorySnapshot::capture(directory)?);

        let mut poll_loop = self.inner.poll_loop.lock();
        if poll_loop
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
        {
            return Ok(()); // Started from another handle meanwhile
        }
        *self.inner.snapshot.write() = Arc::clone(&baseline);

        let cancel = CancellationToken::new();
        runtime.spawn(poll(
            Arc::downgrade(&self.inner),
            directory.clone(),
            self.inner.poll_timeout,
            baseline,
            cancel.clone(),
        ));
        *poll_loop = Some(cancel);

        info!(
            "Started watching {} (poll timeout: {:?})",
            directory.display(),
            self.inner.poll_timeout
        );
        Ok(())
    }

    /// Stop polling. Safe to call when already stopped and from any thread.
    pub fn stop_watching(&self) {
        let mut poll_loop = self.inner.poll_loop.lock();
        if let Some(cancel) = poll_loop.take() {
            // Cancelled under the lock so a stale loop cannot publish after a
            // restart.
            cancel.cancel();
            drop(poll_loop);
            info!("Stopped watching {}", self.inner.watch_directory.display());
        }
    }

    /// Replace the published snapshot unless the loop owning `cancel` was
    /// stopped. Returns whether the snapshot was written.
    fn publish_snapshot(
        &self,
        snapshot: Arc<DirectorySnapshot>,
        cancel: &CancellationToken,
    ) -> bool {
        let _poll_loop = self.inner.poll_loop.lock();
        if cancel.is_cancelled() {
            return false;
        }
        *self.inner.snapshot.write() = snapshot;
        true
    }

    /// Deliver `event` to every eligible subscriber.
    fn notify_subscribers(&self, event: WatchEvent, path: &Path) {
        // Dispatch from a copy so handlers may add or remove subscribers.
        let subscribers = self.subscribers();

        for subscriber in subscribers.iter().filter(|s| s.accepts(event, path)) {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                subscriber.notify(self, event, path);
            }));
            if delivered.is_err() {
                error!("Subscriber panicked handling {event} for {}", path.display());
            }
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("watch_directory", &self.inner.watch_directory)
            .field("poll_timeout", &self.inner.poll_timeout)
            .field("watching", &self.is_watching())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// The poll loop for one start/stop cycle of a watcher.
///
/// Diffs against its own `previous` snapshot so a restarted watcher never
/// mixes listings from two loops.
async fn poll(
    weak: Weak<WatcherInner>,
    directory: PathBuf,
    poll_timeout: Duration,
    mut previous: Arc<DirectorySnapshot>,
    cancel: CancellationToken,
) {
    let mut timer = time::interval(poll_timeout);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the baseline is already taken.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        let current = match capture(directory.clone()).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!("Failed to poll {}: {e}", directory.display());
                continue;
            }
        };

        if cancel.is_cancelled() {
            break;
        }
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let watcher = DirectoryWatcher { inner };

        let changes = previous.diff(&current);
        if !changes.is_empty() {
            debug!(
                "Detected {} change(s) in {}",
                changes.len(),
                directory.display()
            );
        }
        for change in &changes {
            debug!("{} {}", change.event, change.path.display());
            watcher.notify_subscribers(change.event, &change.path);
        }

        if !watcher.publish_snapshot(Arc::clone(&current), &cancel) {
            break;
        }
        previous = current;
    }

    debug!("Poll loop for {} exited", directory.display());
}

/// List the directory on the blocking pool.
async fn capture(directory: PathBuf) -> Result<DirectorySnapshot> {
    tokio::task::spawn_blocking(move || DirectorySnapshot::capture(&directory))
        .await
        .map_err(|e| WatcherError::Io(std::io::Error::other(e)))?
}
