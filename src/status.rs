use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Phase of the enclosing rebuild-reinstall cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Idle,
    Building,
    Installing,
    Ready,
    Error,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Idle => "idle",
            BuildStatus::Building => "building",
            BuildStatus::Installing => "installing",
            BuildStatus::Ready => "ready",
            BuildStatus::Error => "error",
        }
    }
}

/// Latest build-status update with its publication sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatusEvent {
    pub status: BuildStatus,
    pub message: String,
    /// Bumped on every update; readers remember the last sequence they saw
    pub sequence: u64,
}

/// Latest-wins holder for build-status events.
///
/// There is no queue: pollers compare the snapshot's sequence with the last
/// one they observed, so a burst of updates collapses to the newest.
#[derive(Debug)]
pub struct BuildStatusBroadcaster {
    latest: RwLock<BuildStatusEvent>,
}

impl BuildStatusBroadcaster {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(BuildStatusEvent {
                status: BuildStatus::Idle,
                message: String::new(),
                sequence: 0,
            }),
        }
    }

    /// Publish a new status, atomically bumping the sequence.
    pub fn update(&self, status: BuildStatus, message: impl Into<String>) {
        let mut latest = self.latest.write();
        latest.sequence += 1;
        latest.status = status;
        latest.message = message.into();
    }

    /// Snapshot of the current event.
    pub fn snapshot(&self) -> BuildStatusEvent {
        self.latest.read().clone()
    }
}

impl Default for BuildStatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
