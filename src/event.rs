//! Multi-subscriber notification channels.
//!
//! Every contract publishes its notifications through an [`Event`]. Subscribing
//! returns a [`Subscription`] token; the callback stays registered exactly as
//! long as the token is alive. Tokens only hold a weak reference to the
//! channel, so they can outlive the service that owns it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::thread::{self, JoinHandle};

type Delegate<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Channel<T> {
    next_id: AtomicU64,
    delegates: RwLock<Vec<(u64, Delegate<T>)>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: 'static> Detach for Channel<T> {
    fn detach(&self, id: u64) {
        if let Ok(mut delegates) = self.delegates.write() {
            delegates.retain(|(key, _)| *key != id);
        }
    }
}

/// A typed broadcast channel. Delivery order across subscribers is unspecified.
pub struct Event<T> {
    channel: Arc<Channel<T>>,
}

impl<T: 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(Channel {
                next_id: AtomicU64::new(1),
                delegates: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Registers a callback; it is removed when the returned token is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.channel.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut delegates) = self.channel.delegates.write() {
            delegates.push((id, Arc::new(callback)));
        }
        let weak: Weak<dyn Detach> = Arc::downgrade(&(self.channel.clone() as Arc<dyn Detach>));
        Subscription {
            id,
            channel: Some(weak),
        }
    }

    /// Delivers `args` to every current subscriber and returns how many were called.
    pub fn notify(&self, args: &T) -> usize {
        // Callbacks run outside the lock so they may (un)subscribe.
        let snapshot: Vec<Delegate<T>> = match self.channel.delegates.read() {
            Ok(delegates) => delegates.iter().map(|(_, d)| d.clone()).collect(),
            Err(_) => return 0,
        };
        for delegate in &snapshot {
            delegate(args);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.delegates.read().map(|d| d.len()).unwrap_or(0)
    }
}

impl<T: Send + Sync + 'static> Event<T> {
    /// Delivers `args` from a freshly spawned thread.
    pub fn notify_async(&self, args: T) -> JoinHandle<usize> {
        let event = self.clone();
        thread::spawn(move || event.notify(&args))
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.channel.delegates.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("Event").field("subscribers", &count).finish()
    }
}

/// Registration token returned by [`Event::subscribe`].
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    channel: Option<Weak<dyn Detach>>,
}

impl Subscription {
    /// Removes the callback. Calling it again, or after the channel is gone, does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(channel) = self.channel.take().and_then(|weak| weak.upgrade()) {
            channel.detach(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.channel
            .as_ref()
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
