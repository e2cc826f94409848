//! Platform abstraction layer
//!
//! The alarm coordinator never talks to an OS service directly. Every platform
//! collaborator (audio stream volume, alert playback, notifications, wake
//! lock, remote change feed, permission grants) sits behind a trait here.
//! Platform callbacks are plain closures; the coordinator turns them into
//! messages for its inbox.

pub mod feed;
pub mod host;

use crate::error::Result;
use crate::notification::{Notification, NotificationChannel, NotificationId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use feed::FeedHub;
pub use host::HostPlatform;

// ========================================
// Permissions
// ========================================

/// Runtime permissions the service depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Run as a foreground / background service
    ForegroundService,
    /// Post notifications (explicit opt-in on some platforms)
    PostNotifications,
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "foreground_service" => Ok(Permission::ForegroundService),
            "post_notifications" => Ok(Permission::PostNotifications),
            other => Err(format!("Unknown permission: {}", other)),
        }
    }
}

/// Permission grant queries
pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Whether posting notifications requires an explicit grant on this host
    fn notification_opt_in_required(&self) -> bool;
}

// ========================================
// Audio
// ========================================

/// Volume control of the shared output stream the alert plays on
///
/// Writes affect a process-wide stream; only the alarm coordinator calls
/// `set_stream_volume`.
pub trait AudioManager: Send + Sync {
    /// Whether an audio subsystem is present at all
    fn is_available(&self) -> bool;
    fn stream_volume(&self) -> Result<u32>;
    fn max_stream_volume(&self) -> Result<u32>;
    fn set_stream_volume(&self, volume: u32) -> Result<()>;
}

/// Callback invoked from the playback backend when looping playback fails
pub type PlaybackErrorCallback = Box<dyn Fn(String) + Send + Sync>;

/// Creates looping alert playbacks
pub trait AlertPlayer: Send + Sync {
    /// Load the alert sound and start looping it
    ///
    /// Synchronous failures (missing sound, no device) are returned; failures
    /// after playback started are reported through `on_error`.
    fn start_looping(&self, on_error: PlaybackErrorCallback) -> Result<Box<dyn Playback>>;
}

/// A playing alert. Stopping consumes the handle and releases the resource.
pub trait Playback: Send {
    fn stop(self: Box<Self>);
}

// ========================================
// Notifications
// ========================================

/// Host notification manager
pub trait Notifier: Send + Sync {
    /// Register a notification channel (idempotent on the host side)
    fn create_channel(&self, channel: &NotificationChannel) -> Result<()>;

    /// Post or replace the notification with `notification.id`
    fn notify(&self, notification: &Notification) -> Result<()>;

    fn cancel(&self, id: NotificationId);
}

// ========================================
// Power
// ========================================

/// Wake lock provider
pub trait PowerManager: Send + Sync {
    /// Acquire a lock that expires on its own after `timeout`
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> Result<Box<dyn WakeLock>>;
}

/// A held wake lock. Releasing consumes it, so a lock is released at most once.
pub trait WakeLock: Send {
    fn is_held(&self) -> bool;
    fn release(self: Box<Self>);
}

// ========================================
// Change feed
// ========================================

/// Kind of change reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change delivered by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub record_id: String,
    pub kind: ChangeKind,
    pub status: String,
}

impl ChangeEvent {
    pub fn new(record_id: impl Into<String>, kind: ChangeKind, status: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            kind,
            status: status.into(),
        }
    }
}

/// Record status that marks an emergency as waiting for a rescuer
pub const PENDING_STATUS: &str = "pending";

/// Equality query on a remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    /// Path of the watched collection, e.g. `EMERGENCY/riverside/LISTS`
    pub collection_path: String,
    pub field: String,
    pub equals: String,
}

impl FeedFilter {
    /// Pending emergencies of one municipality
    pub fn pending_for(municipality: &str) -> Self {
        Self {
            collection_path: emergency_collection(municipality),
            field: "status".to_string(),
            equals: PENDING_STATUS.to_string(),
        }
    }

    /// Whether a change belongs to this query's result set
    ///
    /// Removals are always delivered: a record leaving the query no longer
    /// carries the filtered status.
    pub fn matches(&self, change: &ChangeEvent) -> bool {
        change.kind == ChangeKind::Removed || change.status == self.equals
    }
}

/// Collection holding the emergency records of a municipality
pub fn emergency_collection(municipality: &str) -> String {
    format!("EMERGENCY/{}/LISTS", municipality)
}

/// What a feed listener receives: one snapshot's changes, or a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Changes(Vec<ChangeEvent>),
    Failed(String),
}

/// Listener invoked by the feed for every snapshot
pub type FeedListener = Box<dyn Fn(FeedUpdate) + Send + Sync>;

/// Remote collection change feed
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, filter: FeedFilter, listener: FeedListener)
        -> Result<Box<dyn FeedSubscription>>;
}

/// A live subscription. Removing consumes it, so it is cancelled at most once.
pub trait FeedSubscription: Send {
    fn remove(self: Box<Self>);
}

// ========================================
// Platform bundle
// ========================================

/// All platform collaborators, shared by the session controller and the
/// coordinators it spawns
#[derive(Clone)]
pub struct Platform {
    pub audio: Arc<dyn AudioManager>,
    pub player: Arc<dyn AlertPlayer>,
    pub notifier: Arc<dyn Notifier>,
    pub power: Arc<dyn PowerManager>,
    pub feed: Arc<dyn ChangeFeed>,
    pub permissions: Arc<dyn PermissionChecker>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_filter() {
        let filter = FeedFilter::pending_for("riverside");
        assert_eq!(filter.collection_path, "EMERGENCY/riverside/LISTS");

        assert!(filter.matches(&ChangeEvent::new("1", ChangeKind::Added, "pending")));
        assert!(!filter.matches(&ChangeEvent::new("2", ChangeKind::Modified, "resolved")));
        assert!(filter.matches(&ChangeEvent::new("3", ChangeKind::Removed, "resolved")));
    }

    #[test]
    fn test_permission_from_str() {
        assert_eq!(
            "post_notifications".parse::<Permission>(),
            Ok(Permission::PostNotifications)
        );
        assert!("camera".parse::<Permission>().is_err());
    }
}
