//! In-process change feed
//!
//! `FeedHub` implements [`ChangeFeed`] for hosts without a remote document
//! store client. Changes are pushed into the hub (the HTTP webhook does this)
//! and fanned out to every subscription whose filter matches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, info};

use super::{ChangeEvent, ChangeFeed, FeedFilter, FeedListener, FeedSubscription, FeedUpdate};
use crate::error::Result;

struct Listener {
    filter: FeedFilter,
    callback: Arc<FeedListener>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

/// Push-driven change feed shared between the webhook and the coordinator
#[derive(Clone, Default)]
pub struct FeedHub {
    inner: Arc<Mutex<HubInner>>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver changes of `collection_path` to matching subscribers
    ///
    /// Returns the number of subscriptions that received at least one change.
    pub fn publish(&self, collection_path: &str, changes: &[ChangeEvent]) -> usize {
        let targets = self.listeners_for(collection_path);
        let mut delivered = 0;

        for (filter, callback) in targets {
            let matching: Vec<ChangeEvent> = changes
                .iter()
                .filter(|change| filter.matches(change))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            callback(FeedUpdate::Changes(matching));
            delivered += 1;
        }

        debug!(
            "Published {} changes on {} to {} subscribers",
            changes.len(),
            collection_path,
            delivered
        );
        delivered
    }

    /// Report a feed failure to every subscriber of `collection_path`
    pub fn fail(&self, collection_path: &str, message: &str) -> usize {
        let targets = self.listeners_for(collection_path);
        for (_, callback) in &targets {
            callback(FeedUpdate::Failed(message.to_string()));
        }
        targets.len()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    // Callbacks run outside the lock so a listener may subscribe or unsubscribe
    fn listeners_for(&self, collection_path: &str) -> Vec<(FeedFilter, Arc<FeedListener>)> {
        self.lock()
            .listeners
            .values()
            .filter(|l| l.filter.collection_path == collection_path)
            .map(|l| (l.filter.clone(), Arc::clone(&l.callback)))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeFeed for FeedHub {
    fn subscribe(
        &self,
        filter: FeedFilter,
        listener: FeedListener,
    ) -> Result<Box<dyn FeedSubscription>> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        info!("Feed subscription {} on {}", id, filter.collection_path);
        inner.listeners.insert(
            id,
            Listener {
                filter,
                callback: Arc::new(listener),
            },
        );

        Ok(Box::new(HubSubscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }))
    }
}

struct HubSubscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl FeedSubscription for HubSubscription {
    fn remove(self: Box<Self>) {
        if let Some(hub) = self.hub.upgrade() {
            let mut inner = hub.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.listeners.remove(&self.id).is_some() {
                info!("Feed subscription {} removed", self.id);
            }
        }
    }
}
