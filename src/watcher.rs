use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};

/// Directory names never scanned
const IGNORED_DIRS: [&str; 2] = [".build", "Packages"];

type Snapshot = HashMap<PathBuf, SystemTime>;

/// Polling watcher over a source tree.
///
/// Takes a `{relative path -> mtime}` snapshot once per poll interval and
/// invokes the change callback after a debounce window whenever files with
/// the configured extension are added, removed, or modified. Polling keeps
/// the behaviour identical across platforms and network filesystems.
pub struct FileWatcher {
    root: PathBuf,
    extension: String,
    poll_interval: Duration,
    debounce: Duration,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(root: PathBuf, config: &WatchConfig) -> Self {
        Self::with_timing(
            root,
            config.extension.clone(),
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.debounce_ms),
        )
    }

    pub fn with_timing(
        root: PathBuf,
        extension: String,
        poll_interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            root,
            extension,
            poll_interval,
            debounce,
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// Start the polling loop. The callback runs on the watcher task after
    /// each debounced change.
    pub fn start<F>(&mut self, on_change: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if !self.root.is_dir() {
            return Err(WatchError::NotADirectory {
                path: self.root.display().to_string(),
            }
            .into());
        }

        let root = self.root.clone();
        let extension = self.extension.clone();
        let poll_interval = self.poll_interval;
        let debounce = self.debounce;
        let token = self.token.clone();

        self.task = Some(tokio::spawn(async move {
            watch_loop(root, extension, poll_interval, debounce, token, on_change).await;
        }));
        Ok(())
    }

    /// Request cancellation; the loop exits at its next sleep boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the loop to finish.
    pub async fn stop(&mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn watch_loop<F>(
    root: PathBuf,
    extension: String,
    poll_interval: Duration,
    debounce: Duration,
    token: CancellationToken,
    on_change: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    debug!("watching {} for .{} changes", root.display(), extension);
    let mut last = take_snapshot(&root, &extension);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(poll_interval) => {}
        }

        let current = take_snapshot(&root, &extension);
        if changed(&last, &current) {
            debug!("source change detected, debouncing");
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(debounce) => {}
            }
            last = take_snapshot(&root, &extension);
            on_change();
        } else {
            last = current;
        }
    }
    debug!("watcher stopped");
}

/// Change predicate: different file count, a new or newer file, or a
/// previously seen file that disappeared.
fn changed(previous: &Snapshot, current: &Snapshot) -> bool {
    if previous.len() != current.len() {
        return true;
    }
    for (path, mtime) in current {
        match previous.get(path) {
            None => return true,
            Some(old) if mtime > old => return true,
            Some(_) => {}
        }
    }
    previous.keys().any(|path| !current.contains_key(path))
}

fn take_snapshot(root: &Path, extension: &str) -> Snapshot {
    let mut snapshot = Snapshot::new();
    scan_dir(root, root, extension, &mut snapshot);
    snapshot
}

fn scan_dir(root: &Path, dir: &Path, extension: &str, out: &mut Snapshot) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot scan {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().unwrap_or_default();
            if IGNORED_DIRS.iter().any(|ignored| name == OsStr::new(ignored)) {
                continue;
            }
            scan_dir(root, &path, extension, out);
        } else if path.extension() == Some(OsStr::new(extension)) {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                out.insert(relative, modified);
            }
        }
    }
}
