//! Live-tailing decorator
//!
//! [`FollowingDecorator`] wraps any [`EventStore`] and turns its finite
//! `get_events` replay into an unbounded stream: history first, then every
//! event `put` afterwards, each delivered exactly once and in order.
//!
//! ## Protocol
//!
//! Every subscription gets a *follower*: an unbounded queue whose receiver
//! doubles as the wakeup signal. Subscribing registers the follower and
//! then takes the wrapped store's snapshot; `put` commits to the wrapped
//! store and then enqueues into every registered follower. Both sequences
//! run under the same commit lock, so each subscription lands entirely
//! before or entirely after each `put`. Before: the snapshot does not hold
//! the event and the queue receives it. After: the snapshot holds it and
//! the queue never sees it. No event is missed and none is seen twice.
//!
//! Dropping a stream deregisters its follower.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use beddy_core::{Cursor, Event};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::StorageError;
use crate::{EventStore, EventStream};

type FollowerId = u64;

/// Registry of live followers
#[derive(Debug, Default)]
struct Followers {
    next_id: FollowerId,
    queues: HashMap<FollowerId, mpsc::UnboundedSender<Event>>,
}

impl Followers {
    fn register(&mut self, queue: mpsc::UnboundedSender<Event>) -> FollowerId {
        let id = self.next_id;
        self.next_id += 1;
        self.queues.insert(id, queue);
        id
    }

    /// Enqueue into every follower, returning how many received it
    fn broadcast(&mut self, event: &Event) -> usize {
        // A closed queue means its stream is being torn down
        self.queues
            .retain(|_, queue| queue.send(event.clone()).is_ok());
        self.queues.len()
    }
}

/// Removes a follower from the registry when its stream is dropped
struct Registration {
    id: FollowerId,
    followers: Weak<Mutex<Followers>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(followers) = self.followers.upgrade() {
            followers.lock().queues.remove(&self.id);
            trace!(follower = self.id, "Follower deregistered");
        }
    }
}

/// Decorator that makes `get_events` follow the log indefinitely
///
/// The stream returned by [`EventStore::get_events`] never terminates while
/// the decorator is alive. If the decorator is dropped, open streams drain
/// whatever is already queued and then end.
///
/// Follower queues are unbounded: a consumer that stops polling without
/// dropping its stream keeps accumulating events.
pub struct FollowingDecorator<S> {
    decorated: S,
    /// Orders commit+broadcast against register+snapshot
    commit: tokio::sync::Mutex<()>,
    followers: Arc<Mutex<Followers>>,
}

impl<S: EventStore> FollowingDecorator<S> {
    /// Wrap a store
    pub fn new(decorated: S) -> Self {
        Self {
            decorated,
            commit: tokio::sync::Mutex::new(()),
            followers: Arc::new(Mutex::new(Followers::default())),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.decorated
    }

    /// Number of currently registered followers
    pub fn follower_count(&self) -> usize {
        self.followers.lock().queues.len()
    }

    fn register(&self, queue: mpsc::UnboundedSender<Event>) -> Registration {
        let id = self.followers.lock().register(queue);
        Registration {
            id,
            followers: Arc::downgrade(&self.followers),
        }
    }
}

impl<S> std::fmt::Debug for FollowingDecorator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowingDecorator")
            .field("followers", &self.followers.lock().queues.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: EventStore> EventStore for FollowingDecorator<S> {
    async fn put(&self, event: Event) -> Result<(), StorageError> {
        let _commit = self.commit.lock().await;

        self.decorated.put(event.clone()).await?;
        let delivered = self.followers.lock().broadcast(&event);

        trace!(
            logical_clock = event.logical_clock,
            followers = delivered,
            "Broadcast event"
        );
        Ok(())
    }

    async fn get_events(&self, from_cursor: Cursor) -> Result<EventStream, StorageError> {
        let (queue, mut live) = mpsc::unbounded_channel();

        let (registration, mut history) = {
            let _commit = self.commit.lock().await;
            let registration = self.register(queue);
            // On error the registration is dropped here and deregisters
            let history = self.decorated.get_events(from_cursor).await?;
            (registration, history)
        };

        debug!(follower = registration.id, from_cursor, "Follower registered");

        Ok(Box::pin(async_stream::stream! {
            let _registration = registration;

            let mut failed = false;
            while let Some(item) = history.next().await {
                failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }

            // Release the backend snapshot before waiting on live events
            drop(history);

            if !failed {
                while let Some(event) = live.recv().await {
                    yield Ok(event);
                }
            }
        }))
    }

    async fn get_last_event(&self) -> Result<Option<Event>, StorageError> {
        self.decorated.get_last_event().await
    }
}
